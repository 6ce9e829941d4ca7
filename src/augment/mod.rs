//! Text augmentation transforms
//!
//! Stochastic rewrites of the text column, applied to a whole batch at once.
//! Every transform draws from an injected RNG, so a fixed seed reproduces the
//! same output bit for bit.

mod concat;
mod crop;
mod translation;

pub use concat::RandomConcat;
pub use crop::{CropBound, RandomCrop};
pub use translation::{RandomTranslation, DEFAULT_LANGUAGES};

use crate::error::Result;
use crate::frame::{FeatureFrame, LabelMatrix};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Default name of the primary text column
pub const TEXT_COLUMN: &str = "comment_text";

/// Frame rows plus, at training time, their labels
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedBatch {
    pub frame: FeatureFrame,
    pub labels: Option<LabelMatrix>,
}

impl AugmentedBatch {
    pub fn new(frame: FeatureFrame, labels: Option<LabelMatrix>) -> Self {
        Self { frame, labels }
    }

    pub fn unlabeled(frame: FeatureFrame) -> Self {
        Self { frame, labels: None }
    }
}

/// What to do with a row whose text has no tokens
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyTextPolicy {
    /// Leave the row unchanged and count it in a warning
    #[default]
    Skip,
    /// Abort with `EmptyText`
    Fail,
}

/// A batch-level augmentation
pub trait Augmentation: Send + Sync {
    fn apply(&self, batch: AugmentedBatch, rng: &mut dyn RngCore) -> Result<AugmentedBatch>;

    fn describe(&self) -> String;
}

/// Serializable description of an augmentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AugmentationConfig {
    Crop {
        min_len: CropBound,
        max_len: CropBound,
        #[serde(default)]
        on_empty: EmptyTextPolicy,
    },
    Translation {
        prob: f64,
        #[serde(default = "default_languages")]
        languages: Vec<String>,
    },
    Concat {
        prob: f64,
    },
}

fn default_languages() -> Vec<String> {
    DEFAULT_LANGUAGES.iter().map(|s| s.to_string()).collect()
}

impl AugmentationConfig {
    /// Instantiate the transform over `text_column`
    pub fn build(&self, text_column: &str) -> Box<dyn Augmentation> {
        match self {
            AugmentationConfig::Crop {
                min_len,
                max_len,
                on_empty,
            } => Box::new(
                RandomCrop::new(*min_len, *max_len)
                    .with_text_column(text_column)
                    .with_empty_policy(*on_empty),
            ),
            AugmentationConfig::Translation { prob, languages } => Box::new(
                RandomTranslation::new(*prob)
                    .with_languages(languages.clone())
                    .with_text_column(text_column),
            ),
            AugmentationConfig::Concat { prob } => {
                Box::new(RandomConcat::new(*prob).with_text_column(text_column))
            }
        }
    }
}
