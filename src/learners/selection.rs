//! Per-label feature selection

use super::logistic::LogisticRegression;
use super::BinaryClassifier;
use crate::error::{Result, StackError};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Feature selection method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectionMethod {
    /// Keep features whose absolute logistic coefficient reaches `threshold`
    CoefficientThreshold { threshold: f64, alpha: f64 },
    /// Keep features whose absolute Pearson correlation with the label
    /// reaches `threshold`
    CorrelationThreshold { threshold: f64 },
}

/// Feature selector fitted on one label's training rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSelector {
    method: SelectionMethod,
    selected_features: Option<Vec<usize>>,
    feature_scores: Option<Vec<f64>>,
    n_features_in: Option<usize>,
}

impl FeatureSelector {
    pub fn new(method: SelectionMethod) -> Self {
        Self {
            method,
            selected_features: None,
            feature_scores: None,
            n_features_in: None,
        }
    }

    /// Select-from-model on an L2 logistic fit
    pub fn coefficient_threshold(threshold: f64) -> Self {
        Self::new(SelectionMethod::CoefficientThreshold { threshold, alpha: 0.01 })
    }

    pub fn correlation_threshold(threshold: f64) -> Self {
        Self::new(SelectionMethod::CorrelationThreshold { threshold })
    }

    pub fn method(&self) -> &SelectionMethod {
        &self.method
    }

    /// Fit on `x` and one label column `y`.
    ///
    /// When no feature reaches the threshold the single best-scoring feature
    /// is kept, so the downstream learner always has an input.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.ncols() == 0 {
            return Err(StackError::InsufficientData(
                "no numeric features to select from".to_string(),
            ));
        }

        let (scores, threshold) = match &self.method {
            SelectionMethod::CoefficientThreshold { threshold, alpha } => {
                let mut model = LogisticRegression::new().with_alpha(*alpha);
                model.fit(x, y)?;
                let scores = model.feature_scores().ok_or(StackError::NotFitted)?;
                (scores.to_vec(), *threshold)
            }
            SelectionMethod::CorrelationThreshold { threshold } => {
                (Self::correlations(x, y), *threshold)
            }
        };

        let mut selected: Vec<usize> = scores
            .iter()
            .enumerate()
            .filter(|(_, &s)| s >= threshold)
            .map(|(i, _)| i)
            .collect();

        if selected.is_empty() {
            let best = scores
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap_or(0);
            debug!(threshold, best, "no feature reached the selection threshold, keeping the strongest");
            selected.push(best);
        }

        self.n_features_in = Some(x.ncols());
        self.feature_scores = Some(scores);
        self.selected_features = Some(selected);
        Ok(())
    }

    fn correlations(x: &Array2<f64>, y: &Array1<f64>) -> Vec<f64> {
        let n = y.len() as f64;
        let y_mean = y.mean().unwrap_or(0.0);
        let y_std = (y.iter().map(|&v| (v - y_mean).powi(2)).sum::<f64>() / n).sqrt();

        x.axis_iter(Axis(1))
            .map(|col| {
                let x_mean = col.iter().filter(|v| !v.is_nan()).sum::<f64>() / n;
                let centred: Vec<f64> = col
                    .iter()
                    .map(|&v| if v.is_nan() { 0.0 } else { v - x_mean })
                    .collect();
                let x_std = (centred.iter().map(|v| v * v).sum::<f64>() / n).sqrt();
                if x_std > 0.0 && y_std > 0.0 {
                    let covariance: f64 = centred
                        .iter()
                        .zip(y.iter())
                        .map(|(&cx, &yv)| cx * (yv - y_mean))
                        .sum::<f64>()
                        / n;
                    (covariance / (x_std * y_std)).abs()
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Keep only the selected columns
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let selected = self.selected_features.as_ref().ok_or(StackError::NotFitted)?;
        if let Some(n_in) = self.n_features_in {
            if x.ncols() != n_in {
                return Err(StackError::DimensionMismatch {
                    expected: n_in,
                    actual: x.ncols(),
                });
            }
        }
        Ok(x.select(Axis(1), selected))
    }

    pub fn selected_features(&self) -> Option<&[usize]> {
        self.selected_features.as_deref()
    }

    pub fn feature_scores(&self) -> Option<&[f64]> {
        self.feature_scores.as_deref()
    }

    pub fn describe(&self) -> String {
        match &self.method {
            SelectionMethod::CoefficientThreshold { threshold, alpha } => {
                format!("select_coef(threshold={}, alpha={})", threshold, alpha)
            }
            SelectionMethod::CorrelationThreshold { threshold } => {
                format!("select_corr(threshold={})", threshold)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_correlation_selects_informative() {
        let x = array![[0.0, 5.0], [1.0, 5.1], [0.0, 4.9], [1.0, 5.0]];
        let y = array![0.0, 1.0, 0.0, 1.0];
        let mut selector = FeatureSelector::correlation_threshold(0.5);
        selector.fit(&x, &y).unwrap();
        assert_eq!(selector.selected_features().unwrap(), &[0]);
        assert_eq!(selector.transform(&x).unwrap().ncols(), 1);
    }

    #[test]
    fn test_nothing_passes_keeps_strongest() {
        let x = array![[0.0, 1.0], [1.0, 1.0], [0.0, 1.0], [1.0, 1.0]];
        let y = array![0.0, 1.0, 0.0, 1.0];
        let mut selector = FeatureSelector::correlation_threshold(2.0);
        selector.fit(&x, &y).unwrap();
        assert_eq!(selector.selected_features().unwrap(), &[0]);
    }

    #[test]
    fn test_transform_before_fit() {
        let selector = FeatureSelector::coefficient_threshold(0.2);
        assert!(matches!(selector.transform(&array![[1.0]]), Err(StackError::NotFitted)));
    }
}
