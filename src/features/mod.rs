//! Feature providers
//!
//! The stacking core never reads files itself. It asks a [`FeatureProvider`]
//! for the base frame of a split, for named feature sets and for the
//! training labels.

mod csv;

pub use self::csv::CsvDataset;

use crate::cache::Split;
use crate::error::{Result, StackError};
use crate::frame::{FeatureFrame, LabelMatrix};
use std::collections::HashMap;

/// Source of input columns and training labels
pub trait FeatureProvider: Send + Sync {
    /// Base columns (ids and raw text) of a split
    fn base(&self, split: Split) -> Result<FeatureFrame>;

    /// The union of the feature sets named by `tags`, aligned to the base
    /// frame's row ids. Unknown tags are `FeatureNotFound`.
    fn columns(&self, tags: &[String], split: Split) -> Result<FeatureFrame>;

    /// Labels of the training split, row-aligned with `base(Split::Train)`
    fn labels(&self) -> &LabelMatrix;

    /// Identifies the data the provider serves; part of artifact fingerprints
    fn describe(&self) -> String {
        String::new()
    }
}

/// In-memory provider, mostly for tests and embedding
#[derive(Debug, Clone)]
pub struct StaticFeatureProvider {
    train: FeatureFrame,
    test: FeatureFrame,
    labels: LabelMatrix,
    feature_sets: HashMap<String, (FeatureFrame, FeatureFrame)>,
}

impl StaticFeatureProvider {
    pub fn new(train: FeatureFrame, labels: LabelMatrix, test: FeatureFrame) -> Result<Self> {
        if train.n_rows() != labels.n_rows() {
            return Err(StackError::DimensionMismatch {
                expected: train.n_rows(),
                actual: labels.n_rows(),
            });
        }
        Ok(Self {
            train,
            test,
            labels,
            feature_sets: HashMap::new(),
        })
    }

    /// Register a feature set; both frames are keyed by the base row ids
    pub fn with_feature_set<S: Into<String>>(mut self, tag: S, train: FeatureFrame, test: FeatureFrame) -> Self {
        self.feature_sets.insert(tag.into(), (train, test));
        self
    }

    pub fn feature_set_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.feature_sets.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl FeatureProvider for StaticFeatureProvider {
    fn base(&self, split: Split) -> Result<FeatureFrame> {
        Ok(match split {
            Split::Train => self.train.clone(),
            Split::Test => self.test.clone(),
        })
    }

    fn columns(&self, tags: &[String], split: Split) -> Result<FeatureFrame> {
        let base = match split {
            Split::Train => &self.train,
            Split::Test => &self.test,
        };
        let mut out = FeatureFrame::new(base.row_ids().to_vec());
        for tag in tags {
            let (train, test) = self
                .feature_sets
                .get(tag)
                .ok_or_else(|| StackError::FeatureNotFound(tag.clone()))?;
            out.join(match split {
                Split::Train => train,
                Split::Test => test,
            })?;
        }
        Ok(out)
    }

    fn labels(&self) -> &LabelMatrix {
        &self.labels
    }

    fn describe(&self) -> String {
        format!(
            "static(train={}, test={}, sets=[{}])",
            self.train.n_rows(),
            self.test.n_rows(),
            self.feature_set_names().join(",")
        )
    }
}
