//! Engine configuration

use crate::augment::TEXT_COLUMN;
use crate::error::{Result, StackError};
use crate::frame::{LabelSchema, TOXICITY_LABELS};
use crate::oof::{CvStrategy, FoldSplitter};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings shared by every build of one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Number of out-of-fold partitions
    pub n_folds: usize,
    pub cv_strategy: CvStrategy,
    /// Seed of the fold partition
    pub seed: u64,
    /// Models of one dependency wave built at the same time
    pub max_parallel_builds: usize,
    /// Fit the folds of one model concurrently
    pub parallel_folds: bool,
    pub text_column: String,
    pub labels: Vec<String>,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            n_folds: 5,
            cv_strategy: CvStrategy::default(),
            seed: 42,
            max_parallel_builds: 4,
            parallel_folds: true,
            text_column: TEXT_COLUMN.to_string(),
            labels: TOXICITY_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl StackConfig {
    /// Read a JSON file; missing fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: StackConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `STACKWISE_N_FOLDS`, `STACKWISE_SEED` and
    /// `STACKWISE_MAX_PARALLEL_BUILDS` when they are set and parse
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(n) = env_parse("STACKWISE_N_FOLDS") {
            self.n_folds = n;
        }
        if let Some(seed) = env_parse("STACKWISE_SEED") {
            self.seed = seed;
        }
        if let Some(n) = env_parse("STACKWISE_MAX_PARALLEL_BUILDS") {
            self.max_parallel_builds = n;
        }
        self
    }

    pub fn with_n_folds(mut self, n_folds: usize) -> Self {
        self.n_folds = n_folds;
        self
    }

    pub fn with_cv_strategy(mut self, strategy: CvStrategy) -> Self {
        self.cv_strategy = strategy;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_parallel_builds(mut self, n: usize) -> Self {
        self.max_parallel_builds = n;
        self
    }

    pub fn with_parallel_folds(mut self, parallel: bool) -> Self {
        self.parallel_folds = parallel;
        self
    }

    pub fn with_text_column<S: Into<String>>(mut self, column: S) -> Self {
        self.text_column = column.into();
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_parallel_builds == 0 {
            return Err(StackError::InvalidParameter {
                name: "max_parallel_builds".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if let CvStrategy::StratifiedKFold { label, .. } = &self.cv_strategy {
            if !self.labels.contains(label) {
                return Err(StackError::FeatureNotFound(label.clone()));
            }
        }
        LabelSchema::new(self.labels.iter().cloned())?;
        Ok(())
    }

    pub fn label_schema(&self) -> Result<LabelSchema> {
        LabelSchema::new(self.labels.iter().cloned())
    }

    pub fn splitter(&self) -> FoldSplitter {
        FoldSplitter::new(self.n_folds, self.cv_strategy.clone()).with_seed(self.seed)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
