//! Random contiguous token crop

use super::{Augmentation, AugmentedBatch, EmptyTextPolicy, TEXT_COLUMN};
use crate::error::{Result, StackError};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Crop length bound
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropBound {
    /// Absolute number of tokens
    Tokens(usize),
    /// Fraction of the example's own token count, rounded up
    Fraction(f64),
}

impl CropBound {
    pub fn resolve(&self, n_tokens: usize) -> usize {
        match *self {
            CropBound::Tokens(k) => k,
            CropBound::Fraction(f) => (f * n_tokens as f64).ceil().max(0.0) as usize,
        }
    }
}

impl From<usize> for CropBound {
    fn from(k: usize) -> Self {
        CropBound::Tokens(k)
    }
}

impl From<f64> for CropBound {
    fn from(f: f64) -> Self {
        CropBound::Fraction(f)
    }
}

/// Keeps a random contiguous run of whitespace tokens
#[derive(Debug, Clone)]
pub struct RandomCrop {
    min_len: CropBound,
    max_len: CropBound,
    text_column: String,
    on_empty: EmptyTextPolicy,
}

impl RandomCrop {
    pub fn new(min_len: impl Into<CropBound>, max_len: impl Into<CropBound>) -> Self {
        Self {
            min_len: min_len.into(),
            max_len: max_len.into(),
            text_column: TEXT_COLUMN.to_string(),
            on_empty: EmptyTextPolicy::default(),
        }
    }

    pub fn with_text_column<S: Into<String>>(mut self, column: S) -> Self {
        self.text_column = column.into();
        self
    }

    pub fn with_empty_policy(mut self, policy: EmptyTextPolicy) -> Self {
        self.on_empty = policy;
        self
    }

    /// `(min, max)` crop lengths for a text of `n_tokens` tokens
    pub fn bounds(&self, n_tokens: usize) -> (usize, usize) {
        let max_len = self.max_len.resolve(n_tokens).min(n_tokens);
        let min_len = self.min_len.resolve(n_tokens).min(max_len);
        (min_len, max_len)
    }

    /// Draw `(offset, length)` for a text of `n_tokens` tokens
    pub fn draw(&self, n_tokens: usize, rng: &mut dyn RngCore) -> (usize, usize) {
        let (min_len, max_len) = self.bounds(n_tokens);
        let length = rng.gen_range(min_len..=max_len);
        let offset = rng.gen_range(0..=n_tokens - length);
        (offset, length)
    }

    /// Crop one text. `row` only labels the error.
    pub fn crop_text(&self, text: &str, row: usize, rng: &mut dyn RngCore) -> Result<String> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(StackError::EmptyText { row });
        }
        let (offset, length) = self.draw(tokens.len(), rng);
        Ok(tokens[offset..offset + length].join(" "))
    }
}

impl Augmentation for RandomCrop {
    fn apply(&self, mut batch: AugmentedBatch, rng: &mut dyn RngCore) -> Result<AugmentedBatch> {
        let texts = batch.frame.text_mut(&self.text_column)?;
        let mut skipped = 0usize;
        for (row, text) in texts.iter_mut().enumerate() {
            match self.crop_text(text, row, rng) {
                Ok(cropped) => *text = cropped,
                Err(StackError::EmptyText { .. }) if self.on_empty == EmptyTextPolicy::Skip => {
                    skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        if skipped > 0 {
            warn!(skipped, column = %self.text_column, "left texts without tokens uncropped");
        }
        Ok(batch)
    }

    fn describe(&self) -> String {
        format!("random_crop({:?}, {:?})", self.min_len, self.max_len)
    }
}
