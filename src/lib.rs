//! stackwise - Multi-level stacking for multi-label text classification
//!
//! This crate builds ensembles of text classifiers level by level:
//! - Named models in a registry, each declaring its feature sets and the
//!   models it stacks on
//! - Leakage-free out-of-fold predictions, persisted per model and reused
//!   while nothing upstream changes
//! - Aggregation operators (simple, weighted, grouped and bagged averaging)
//! - Seeded text augmentation (crop, translation substitution, concat)
//!
//! # Modules
//!
//! ## Core
//! - [`registry`] - Model specs and the frozen registry
//! - [`resolver`] - Dependency order, waves and the build orchestrator
//! - [`oof`] - K-fold partitioning and out-of-fold prediction
//! - [`cache`] - Prediction artifact stores
//!
//! ## Models
//! - [`estimator`] - Estimator trait, pipelines, multi-label and augmented adapters
//! - [`ensemble`] - Aggregation operators
//! - [`augment`] - Text augmentation transforms
//! - [`learners`] - Logistic regression, boosted trees, feature selection
//! - [`text`] - TF-IDF vectorisation
//!
//! ## Data and tooling
//! - [`frame`] - Feature frames and label matrices
//! - [`features`] - Feature providers and the CSV dataset
//! - [`metrics`] - ROC AUC of out-of-fold predictions
//! - [`presets`] - Ready-made toxicity registry
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;
pub mod config;

// Data
pub mod frame;
pub mod features;

// Models
pub mod augment;
pub mod ensemble;
pub mod estimator;
pub mod learners;
pub mod text;

// Stacking core
pub mod cache;
pub mod oof;
pub mod registry;
pub mod resolver;

// Tooling
pub mod metrics;
pub mod presets;
pub mod cli;

pub use error::{Result, StackError};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::augment::{Augmentation, AugmentedBatch, EmptyTextPolicy, RandomConcat, RandomCrop, RandomTranslation};
    pub use crate::cache::{ArtifactKey, ArtifactStore, FileStore, MemoryStore, PredictionArtifact, Split};
    pub use crate::config::StackConfig;
    pub use crate::ensemble::{Bagged, GroupSpec, GroupedAverage, SimpleAverage, WeightedAverage, Weights};
    pub use crate::error::{Result, StackError};
    pub use crate::estimator::{factory, AugmentedEstimator, Estimator, EstimatorFactory, EstimatorKind, MultiLabel, Pipeline, PipelineNode};
    pub use crate::features::{CsvDataset, FeatureProvider, StaticFeatureProvider};
    pub use crate::frame::{FeatureFrame, LabelMatrix, LabelSchema};
    pub use crate::oof::{CancellationToken, CvStrategy, FoldSplitter, OofRunner};
    pub use crate::registry::{ModelRegistry, ModelSpec, RegistryBuilder};
    pub use crate::resolver::{BuildOrchestrator, BuildReport, BuildStatus, FailurePolicy};
}
