//! Logistic regression for one binary label

use super::BinaryClassifier;
use crate::error::{Result, StackError};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// L2-regularised logistic regression fitted by gradient descent.
///
/// Features are standardised internally so one learning rate works for raw
/// TF-IDF weights and for upstream probabilities alike.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Fitted coefficients, in the standardised feature space
    pub coefficients: Option<Array1<f64>>,
    /// Fitted intercept
    pub intercept: Option<f64>,
    /// Regularization strength (L2)
    pub alpha: f64,
    /// Maximum iterations
    pub max_iter: usize,
    /// Convergence tolerance on the gradient norm
    pub tol: f64,
    /// Learning rate
    pub learning_rate: f64,
    /// Re-weight classes inversely to their frequency
    pub balanced: bool,
    means: Option<Array1<f64>>,
    scales: Option<Array1<f64>>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: None,
            alpha: 0.01,
            max_iter: 500,
            tol: 1e-6,
            learning_rate: 0.5,
            balanced: false,
            means: None,
            scales: None,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_balanced(mut self, balanced: bool) -> Self {
        self.balanced = balanced;
        self
    }

    fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
        z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
    }

    fn standardise(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (means, scales) = match (&self.means, &self.scales) {
            (Some(m), Some(s)) => (m, s),
            _ => return Err(StackError::NotFitted),
        };
        if x.ncols() != means.len() {
            return Err(StackError::DimensionMismatch {
                expected: means.len(),
                actual: x.ncols(),
            });
        }
        let mut out = x.to_owned();
        out -= &means.view().insert_axis(Axis(0));
        out /= &scales.view().insert_axis(Axis(0));
        // Missing inputs land on the column mean
        out.mapv_inplace(|v| if v.is_nan() { 0.0 } else { v });
        Ok(out)
    }
}

impl BinaryClassifier for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(StackError::ShapeMismatch {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(StackError::InsufficientData("no training rows".to_string()));
        }

        let clean = x.mapv(|v| if v.is_nan() { 0.0 } else { v });
        let means = clean.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_features));
        let scales = clean
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 1e-12 { s } else { 1.0 });
        self.means = Some(means);
        self.scales = Some(scales);
        let xs = self.standardise(x)?;

        let sample_weights = if self.balanced {
            let pos = y.iter().filter(|&&v| v > 0.5).count() as f64;
            let neg = n_samples as f64 - pos;
            let (w_pos, w_neg) = if pos > 0.0 && neg > 0.0 {
                (n_samples as f64 / (2.0 * pos), n_samples as f64 / (2.0 * neg))
            } else {
                (1.0, 1.0)
            };
            y.mapv(|v| if v > 0.5 { w_pos } else { w_neg })
        } else {
            Array1::ones(n_samples)
        };

        let mut weights = Array1::zeros(n_features);
        let mut bias = 0.0;
        let lr = self.learning_rate;
        let alpha = self.alpha;

        for _iter in 0..self.max_iter {
            let linear = xs.dot(&weights) + bias;
            let predictions = Self::sigmoid(&linear);

            let errors = (&predictions - y) * &sample_weights;
            let dw = (xs.t().dot(&errors) / n_samples as f64) + (alpha * &weights);
            let db = errors.mean().unwrap_or(0.0);

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < self.tol {
                break;
            }

            weights = weights - lr * dw;
            bias -= lr * db;
        }

        self.coefficients = Some(weights);
        self.intercept = Some(bias);
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(StackError::NotFitted)?;
        let intercept = self.intercept.unwrap_or(0.0);
        let xs = self.standardise(x)?;
        Ok(Self::sigmoid(&(xs.dot(coefficients) + intercept)))
    }

    /// Absolute standardised coefficients
    fn feature_scores(&self) -> Option<Array1<f64>> {
        self.coefficients.as_ref().map(|c| c.mapv(f64::abs))
    }

    fn describe(&self) -> String {
        format!(
            "logistic(alpha={}, max_iter={}, lr={}, balanced={})",
            self.alpha, self.max_iter, self.learning_rate, self.balanced
        )
    }
}
