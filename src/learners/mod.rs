//! Reference binary learners
//!
//! Small, dependency-free learning algorithms used by the preset registry:
//! - Logistic regression (gradient descent, L2)
//! - Gradient-boosted regression trees for log-loss
//! - Per-label feature selection
//!
//! The stacking core only sees them through [`crate::estimator::MultiLabel`].

mod boosting;
mod logistic;
mod selection;
mod tree;

pub use boosting::{default_rounds, BoostingConfig, GradientBoostingClassifier};
pub use logistic::LogisticRegression;
pub use selection::{FeatureSelector, SelectionMethod};
pub use tree::{RegressionTree, TreeNode};

use crate::error::Result;
use ndarray::{Array1, Array2};

/// Probabilistic classifier for a single binary label
pub trait BinaryClassifier: Send {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Probability of the positive class, one value per row
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    fn reseed(&mut self, _seed: u64) {}

    /// Non-negative per-feature importance, if the learner exposes one
    fn feature_scores(&self) -> Option<Array1<f64>> {
        None
    }

    fn describe(&self) -> String;
}
