//! Gradient-boosted trees for binary log-loss

use super::tree::RegressionTree;
use super::BinaryClassifier;
use crate::error::{Result, StackError};
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Gradient boosting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingConfig {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Row subsample ratio for each tree
    pub subsample: f64,
    /// Column subsample ratio for each tree
    pub colsample_bytree: f64,
    /// L2 regularization on leaf values
    pub reg_lambda: f64,
    /// Fraction of rows held out to report validation log-loss
    pub validation_fraction: Option<f64>,
    pub random_state: u64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 10,
            subsample: 0.8,
            colsample_bytree: 0.8,
            reg_lambda: 1.0,
            validation_fraction: None,
            random_state: 42,
        }
    }
}

impl BoostingConfig {
    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_validation_fraction(mut self, fraction: f64) -> Self {
        self.validation_fraction = Some(fraction);
        self
    }
}

/// Number of boosting rounds per toxicity label, as tuned for the level-2 stackers
pub fn default_rounds(label: &str) -> usize {
    match label {
        "toxic" => 140,
        "severe_toxic" => 50,
        "insult" => 70,
        _ => 80,
    }
}

/// Gradient-boosted binary classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    config: BoostingConfig,
    trees: Vec<RegressionTree>,
    col_indices_per_tree: Vec<Vec<usize>>,
    initial_log_odds: f64,
    feature_importances: Vec<f64>,
    fitted: bool,
}

impl GradientBoostingClassifier {
    pub fn new(config: BoostingConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            col_indices_per_tree: Vec::new(),
            initial_log_odds: 0.0,
            feature_importances: Vec::new(),
            fitted: false,
        }
    }

    pub fn config(&self) -> &BoostingConfig {
        &self.config
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    fn sigmoid(v: f64) -> f64 {
        1.0 / (1.0 + (-v).exp())
    }

    fn log_loss(y: &Array1<f64>, p: &Array1<f64>) -> f64 {
        let eps = 1e-15;
        let total: f64 = y
            .iter()
            .zip(p.iter())
            .map(|(&t, &q)| {
                let q = q.clamp(eps, 1.0 - eps);
                -(t * q.ln() + (1.0 - t) * (1.0 - q).ln())
            })
            .sum();
        total / y.len().max(1) as f64
    }

    fn sample_indices(n: usize, ratio: f64, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        let size = (((n as f64) * ratio).ceil() as usize).clamp(1, n.max(1));
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(rng);
        indices.truncate(size);
        indices.sort_unstable();
        indices
    }

    fn raw_scores(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let mut log_odds = Array1::from_elem(x.nrows(), self.initial_log_odds);
        for (tree, cols) in self.trees.iter().zip(self.col_indices_per_tree.iter()) {
            let x_sub = x.select(Axis(1), cols);
            let tree_pred = tree.predict(&x_sub)?;
            log_odds.scaled_add(self.config.learning_rate, &tree_pred);
        }
        Ok(log_odds)
    }
}

impl BinaryClassifier for GradientBoostingClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(StackError::ShapeMismatch {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(StackError::InsufficientData("no training rows".to_string()));
        }

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);

        // Optional holdout, only used for reporting
        let (x_fit, y_fit, holdout) = match self.config.validation_fraction {
            Some(frac) if frac > 0.0 && x.nrows() >= 20 => {
                let mut order: Vec<usize> = (0..x.nrows()).collect();
                order.shuffle(&mut rng);
                let n_valid = ((x.nrows() as f64) * frac).ceil() as usize;
                let (valid, train) = order.split_at(n_valid);
                (
                    x.select(Axis(0), train),
                    y.select(Axis(0), train),
                    Some((x.select(Axis(0), valid), y.select(Axis(0), valid))),
                )
            }
            _ => (x.to_owned(), y.to_owned(), None),
        };

        let n_samples = x_fit.nrows();
        let n_features = x_fit.ncols();

        let p = y_fit.mean().unwrap_or(0.5).clamp(1e-6, 1.0 - 1e-6);
        self.initial_log_odds = (p / (1.0 - p)).ln();
        self.trees.clear();
        self.col_indices_per_tree.clear();
        self.feature_importances = vec![0.0; n_features];

        let mut log_odds = Array1::from_elem(n_samples, self.initial_log_odds);

        for _ in 0..self.config.n_estimators {
            // Negative gradient of log-loss
            let residuals: Array1<f64> = y_fit
                .iter()
                .zip(log_odds.iter())
                .map(|(&yi, &lo)| yi - Self::sigmoid(lo))
                .collect();

            let rows = Self::sample_indices(n_samples, self.config.subsample, &mut rng);
            let cols = Self::sample_indices(n_features, self.config.colsample_bytree, &mut rng);

            let x_sub = x_fit.select(Axis(0), &rows).select(Axis(1), &cols);
            let r_sub = residuals.select(Axis(0), &rows);

            let mut tree = RegressionTree::new()
                .with_max_depth(self.config.max_depth)
                .with_min_samples_leaf(self.config.min_samples_leaf)
                .with_reg_lambda(self.config.reg_lambda);
            tree.fit(&x_sub, &r_sub)?;

            // Every row advances, not only the subsample
            let update = tree.predict(&x_fit.select(Axis(1), &cols))?;
            log_odds.scaled_add(self.config.learning_rate, &update);

            if let Some(importance) = tree.feature_importances() {
                for (j, &col) in cols.iter().enumerate() {
                    self.feature_importances[col] += importance[j];
                }
            }

            self.trees.push(tree);
            self.col_indices_per_tree.push(cols);
        }

        let total: f64 = self.feature_importances.iter().sum();
        if total > 0.0 {
            for imp in &mut self.feature_importances {
                *imp /= total;
            }
        }
        self.fitted = true;

        if let Some((x_valid, y_valid)) = holdout {
            let p_valid = self.predict_proba(&x_valid)?;
            debug!(
                rounds = self.config.n_estimators,
                valid_rows = y_valid.len(),
                valid_logloss = Self::log_loss(&y_valid, &p_valid),
                "boosting finished"
            );
        }

        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.fitted {
            return Err(StackError::NotFitted);
        }
        Ok(self.raw_scores(x)?.mapv(Self::sigmoid))
    }

    fn reseed(&mut self, seed: u64) {
        self.config.random_state = seed;
    }

    fn feature_scores(&self) -> Option<Array1<f64>> {
        self.fitted.then(|| Array1::from_vec(self.feature_importances.clone()))
    }

    fn describe(&self) -> String {
        format!(
            "gbt(rounds={}, lr={}, depth={}, subsample={}, colsample={}, lambda={})",
            self.config.n_estimators,
            self.config.learning_rate,
            self.config.max_depth,
            self.config.subsample,
            self.config.colsample_bytree,
            self.config.reg_lambda
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classification_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec((100, 2), (0..200).map(|i| i as f64 * 0.1).collect()).unwrap();
        let y: Array1<f64> = x
            .rows()
            .into_iter()
            .map(|row| if row[0] + row[1] > 10.0 { 1.0 } else { 0.0 })
            .collect();
        (x, y)
    }

    #[test]
    fn test_boosting_learns_threshold() {
        let (x, y) = classification_data();
        let config = BoostingConfig::default().with_n_estimators(20);
        let mut model = GradientBoostingClassifier::new(config);
        model.fit(&x, &y).unwrap();

        let proba = model.predict_proba(&x).unwrap();
        let correct = proba
            .iter()
            .zip(y.iter())
            .filter(|(&p, &t)| (p > 0.5) == (t > 0.5))
            .count();
        assert!(correct as f64 / 100.0 > 0.9);
    }

    #[test]
    fn test_same_seed_same_model() {
        let (x, y) = classification_data();
        let config = BoostingConfig::default().with_n_estimators(5).with_validation_fraction(0.1);
        let mut a = GradientBoostingClassifier::new(config.clone());
        let mut b = GradientBoostingClassifier::new(config);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_default_rounds() {
        assert_eq!(default_rounds("toxic"), 140);
        assert_eq!(default_rounds("severe_toxic"), 50);
        assert_eq!(default_rounds("identity_hate"), 80);
    }
}
