//! Estimator adapter
//!
//! Every model in the registry is built from an [`Estimator`]: something that
//! can be fitted on a feature frame plus label matrix and then predict
//! per-label probabilities for new rows. Learners, pipelines, aggregation
//! operators and wrappers all implement the same trait, so the orchestrator
//! never needs to know which concrete algorithm sits behind a model name.

mod augmented;
mod multilabel;
pub mod pipeline;

pub use augmented::AugmentedEstimator;
pub use multilabel::{ClassifierFactory, MultiLabel};
pub use pipeline::{Pipeline, PipelineNode, Transform};

use crate::error::Result;
use crate::frame::{FeatureFrame, LabelMatrix};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Coarse family of an estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EstimatorKind {
    Linear,
    TreeEnsemble,
    Neural,
    /// Pipelines and wrappers around other estimators
    Composite,
    /// Operators that only combine upstream predictions
    Aggregate,
}

impl fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EstimatorKind::Linear => "linear",
            EstimatorKind::TreeEnsemble => "tree-ensemble",
            EstimatorKind::Neural => "neural",
            EstimatorKind::Composite => "composite",
            EstimatorKind::Aggregate => "aggregate",
        };
        f.write_str(s)
    }
}

/// Multi-label probabilistic estimator
pub trait Estimator: Send {
    /// Fit on `frame`, whose rows align with `labels`
    fn fit(&mut self, frame: &FeatureFrame, labels: &LabelMatrix) -> Result<()>;

    /// Per-label probabilities, one row per frame row
    fn predict(&self, frame: &FeatureFrame) -> Result<LabelMatrix>;

    fn kind(&self) -> EstimatorKind;

    /// Replace the random seed. Estimators without randomness ignore it.
    fn reseed(&mut self, _seed: u64) {}

    /// Short description, stable across runs; part of the artifact fingerprint
    fn describe(&self) -> String;
}

/// Creates a fresh, unfitted estimator
pub type EstimatorFactory = Arc<dyn Fn() -> Box<dyn Estimator> + Send + Sync>;

/// Wrap a closure as an [`EstimatorFactory`]
pub fn factory<F, E>(f: F) -> EstimatorFactory
where
    F: Fn() -> E + Send + Sync + 'static,
    E: Estimator + 'static,
{
    Arc::new(move || Box::new(f()) as Box<dyn Estimator>)
}
