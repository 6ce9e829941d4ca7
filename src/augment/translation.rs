//! Substitution with pre-computed translations

use super::{Augmentation, AugmentedBatch, TEXT_COLUMN};
use crate::error::{Result, StackError};
use crate::frame::COLUMN_SEPARATOR;
use rand::{Rng, RngCore};

/// Languages with pre-computed translations in the toxicity data
pub const DEFAULT_LANGUAGES: [&str; 3] = ["de", "fr", "es"];

/// With probability `prob`, replaces a row's text with its translation into
/// a uniformly drawn language, read from the `{text}__{lang}` column.
#[derive(Debug, Clone)]
pub struct RandomTranslation {
    prob: f64,
    languages: Vec<String>,
    text_column: String,
}

impl RandomTranslation {
    pub fn new(prob: f64) -> Self {
        Self {
            prob,
            languages: DEFAULT_LANGUAGES.iter().map(|s| s.to_string()).collect(),
            text_column: TEXT_COLUMN.to_string(),
        }
    }

    pub fn with_languages(mut self, languages: Vec<String>) -> Self {
        self.languages = languages;
        self
    }

    pub fn with_text_column<S: Into<String>>(mut self, column: S) -> Self {
        self.text_column = column.into();
        self
    }

    pub fn translation_column(&self, language: &str) -> String {
        format!("{}{}{}", self.text_column, COLUMN_SEPARATOR, language)
    }
}

impl Augmentation for RandomTranslation {
    fn apply(&self, mut batch: AugmentedBatch, rng: &mut dyn RngCore) -> Result<AugmentedBatch> {
        if !(0.0..=1.0).contains(&self.prob) {
            return Err(StackError::InvalidParameter {
                name: "prob".to_string(),
                value: self.prob.to_string(),
                reason: "must lie in [0, 1]".to_string(),
            });
        }
        if self.languages.is_empty() {
            return Err(StackError::InvalidParameter {
                name: "languages".to_string(),
                value: "[]".to_string(),
                reason: "at least one candidate language is required".to_string(),
            });
        }

        let translations: Vec<Vec<String>> = self
            .languages
            .iter()
            .map(|lang| batch.frame.text(&self.translation_column(lang)).map(<[String]>::to_vec))
            .collect::<Result<_>>()?;

        let texts = batch.frame.text_mut(&self.text_column)?;
        for (row, text) in texts.iter_mut().enumerate() {
            // Both draws happen for every row so the stream stays aligned
            let r: f64 = rng.gen();
            let lang = rng.gen_range(0..translations.len());
            if r < self.prob {
                *text = translations[lang][row].clone();
            }
        }
        Ok(batch)
    }

    fn describe(&self) -> String {
        format!("random_translation(p={}, langs={})", self.prob, self.languages.join(","))
    }
}
