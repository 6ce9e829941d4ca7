//! Simple and weighted averaging of prediction blocks

use super::{average_blocks, model_block, prediction_blocks};
use crate::error::{Result, StackError};
use crate::estimator::{Estimator, EstimatorKind};
use crate::frame::{FeatureFrame, LabelMatrix, LabelSchema};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Per-label arithmetic mean over every prediction block in the frame
#[derive(Debug, Clone, Default)]
pub struct SimpleAverage {
    schema: Option<LabelSchema>,
}

impl SimpleAverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mean of the given blocks; a single block comes back unchanged
    pub fn combine(&self, blocks: &[LabelMatrix]) -> Result<LabelMatrix> {
        average_blocks(blocks)
    }
}

impl Estimator for SimpleAverage {
    fn fit(&mut self, _frame: &FeatureFrame, labels: &LabelMatrix) -> Result<()> {
        self.schema = Some(labels.schema().clone());
        Ok(())
    }

    fn predict(&self, frame: &FeatureFrame) -> Result<LabelMatrix> {
        let schema = self.schema.as_ref().ok_or(StackError::NotFitted)?;
        let blocks: Vec<LabelMatrix> = prediction_blocks(frame, schema)?
            .into_iter()
            .map(|(_, block)| block)
            .collect();
        self.combine(&blocks)
    }

    fn kind(&self) -> EstimatorKind {
        EstimatorKind::Aggregate
    }

    fn describe(&self) -> String {
        "simple_average".to_string()
    }
}

/// Averaging weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Weights {
    /// One weight per model, shared by every label
    Flat(Vec<f64>),
    /// `models x labels` weights
    PerLabel(Array2<f64>),
}

impl Weights {
    fn n_models(&self) -> usize {
        match self {
            Weights::Flat(w) => w.len(),
            Weights::PerLabel(w) => w.nrows(),
        }
    }

    /// Expand to a `models x labels` matrix
    fn matrix(&self, n_labels: usize) -> Result<Array2<f64>> {
        match self {
            Weights::Flat(w) => {
                let column = ndarray::Array1::from(w.clone()).insert_axis(Axis(1));
                Ok(column.broadcast((w.len(), n_labels))
                    .ok_or_else(|| StackError::ShapeMismatch {
                        expected: format!("({}, {})", w.len(), n_labels),
                        actual: format!("({}, 1)", w.len()),
                    })?
                    .to_owned())
            }
            Weights::PerLabel(w) => {
                if w.ncols() != n_labels {
                    return Err(StackError::DimensionMismatch {
                        expected: n_labels,
                        actual: w.ncols(),
                    });
                }
                Ok(w.clone())
            }
        }
    }
}

/// Weighted sum of prediction blocks, optionally renormalised.
///
/// With `renorm` the result is divided by the per-label sum of weights, so
/// weights only need to be proportional. Probabilities are never clipped.
#[derive(Debug, Clone)]
pub struct WeightedAverage {
    weights: Weights,
    renorm: bool,
    models: Option<Vec<String>>,
    schema: Option<LabelSchema>,
}

impl WeightedAverage {
    pub fn new(weights: Weights, renorm: bool) -> Self {
        Self {
            weights,
            renorm,
            models: None,
            schema: None,
        }
    }

    pub fn flat(weights: Vec<f64>, renorm: bool) -> Self {
        Self::new(Weights::Flat(weights), renorm)
    }

    /// Read blocks of these models, in this order, instead of discovering them
    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = Some(models.into_iter().map(Into::into).collect());
        self
    }

    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    pub fn combine(&self, blocks: &[LabelMatrix]) -> Result<LabelMatrix> {
        if blocks.len() != self.weights.n_models() {
            return Err(StackError::DimensionMismatch {
                expected: self.weights.n_models(),
                actual: blocks.len(),
            });
        }
        let first = blocks.first().ok_or_else(|| {
            StackError::InsufficientData("no prediction blocks to average".to_string())
        })?;
        let w = self.weights.matrix(first.n_labels())?;

        let mut out = Array2::<f64>::zeros(first.values().raw_dim());
        for (k, block) in blocks.iter().enumerate() {
            if block.values().raw_dim() != out.raw_dim() {
                return Err(StackError::ShapeMismatch {
                    expected: format!("{:?}", out.shape()),
                    actual: format!("{:?}", block.values().shape()),
                });
            }
            out += &(block.values() * &w.row(k).insert_axis(Axis(0)));
        }

        if self.renorm {
            let totals = w.sum_axis(Axis(0));
            if let Some(j) = totals.iter().position(|t| t.abs() < f64::EPSILON) {
                return Err(StackError::InvalidParameter {
                    name: "weights".to_string(),
                    value: format!("{:?}", w.column(j).to_vec()),
                    reason: "cannot renormalise weights that sum to zero".to_string(),
                });
            }
            out /= &totals.insert_axis(Axis(0));
        }

        LabelMatrix::new(first.schema().clone(), out)
    }
}

impl Estimator for WeightedAverage {
    fn fit(&mut self, _frame: &FeatureFrame, labels: &LabelMatrix) -> Result<()> {
        let schema = labels.schema().clone();
        self.weights.matrix(schema.len())?;
        self.schema = Some(schema);
        Ok(())
    }

    fn predict(&self, frame: &FeatureFrame) -> Result<LabelMatrix> {
        let schema = self.schema.as_ref().ok_or(StackError::NotFitted)?;
        let blocks = match &self.models {
            Some(models) => models
                .iter()
                .map(|m| model_block(frame, m, schema))
                .collect::<Result<Vec<_>>>()?,
            None => prediction_blocks(frame, schema)?
                .into_iter()
                .map(|(_, block)| block)
                .collect(),
        };
        self.combine(&blocks)
    }

    fn kind(&self) -> EstimatorKind {
        EstimatorKind::Aggregate
    }

    fn describe(&self) -> String {
        format!(
            "weighted_average(weights={:?}, renorm={}, models={:?})",
            self.weights, self.renorm, self.models
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn schema() -> LabelSchema {
        LabelSchema::new(["toxic", "insult"]).unwrap()
    }

    fn block(values: Array2<f64>) -> LabelMatrix {
        LabelMatrix::new(schema(), values).unwrap()
    }

    #[test]
    fn test_simple_average_identity() {
        let b = block(array![[0.1, 0.9], [0.3, 0.7]]);
        let avg = SimpleAverage::new().combine(std::slice::from_ref(&b)).unwrap();
        assert_eq!(avg, b);
    }

    #[test]
    fn test_simple_average_two_blocks() {
        let avg = SimpleAverage::new()
            .combine(&[block(array![[0.2, 0.4]]), block(array![[0.4, 0.8]])])
            .unwrap();
        assert!((avg.values()[[0, 0]] - 0.3).abs() < 1e-12);
        assert!((avg.values()[[0, 1]] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_renorm() {
        let blocks = [block(array![[0.2, 0.2]]), block(array![[0.8, 0.8]])];
        let avg = WeightedAverage::flat(vec![1.0, 3.0], true).combine(&blocks).unwrap();
        assert!((avg.values()[[0, 0]] - 0.65).abs() < 1e-12);

        let raw = WeightedAverage::flat(vec![1.0, 3.0], false).combine(&blocks).unwrap();
        assert!((raw.values()[[0, 0]] - 2.6).abs() < 1e-12);
    }

    #[test]
    fn test_equal_weights() {
        let a = block(array![[0.2, 0.4]]);
        let b = block(array![[0.4, 0.5]]);
        let blocks = [a.clone(), b.clone()];

        let renormed = WeightedAverage::flat(vec![2.0, 2.0], true).combine(&blocks).unwrap();
        let simple = SimpleAverage::new().combine(&blocks).unwrap();
        assert!((renormed.values() - simple.values()).iter().all(|d| d.abs() < 1e-12));
        assert!((renormed.values()[[0, 0]] - 0.3).abs() < 1e-12);
        assert!((renormed.values()[[0, 1]] - 0.45).abs() < 1e-12);

        // Unscaled: 2 * (a + b), above 1 and left unclipped
        let raw = WeightedAverage::flat(vec![2.0, 2.0], false).combine(&blocks).unwrap();
        let expected = (a.values() + b.values()) * 2.0;
        assert!((raw.values() - &expected).iter().all(|d| d.abs() < 1e-12));
        assert!((raw.values()[[0, 1]] - 1.8).abs() < 1e-12);
    }

    #[test]
    fn test_per_label_weights() {
        let blocks = [block(array![[1.0, 1.0]]), block(array![[0.0, 0.0]])];
        let weights = Weights::PerLabel(array![[1.0, 0.0], [1.0, 1.0]]);
        let avg = WeightedAverage::new(weights, true).combine(&blocks).unwrap();
        assert!((avg.values()[[0, 0]] - 0.5).abs() < 1e-12);
        assert!(avg.values()[[0, 1]].abs() < 1e-12);
    }

    #[test]
    fn test_weight_count_mismatch() {
        let blocks = [block(array![[0.1, 0.1]]), block(array![[0.2, 0.2]])];
        let err = WeightedAverage::flat(vec![1.0, 1.0, 1.0], true).combine(&blocks);
        assert!(matches!(err, Err(StackError::DimensionMismatch { expected: 3, actual: 2 })));
    }

    #[test]
    fn test_estimator_reads_named_blocks() {
        let frame = FeatureFrame::with_row_count(1)
            .with_numeric("a__toxic", vec![0.2])
            .unwrap()
            .with_numeric("a__insult", vec![0.4])
            .unwrap()
            .with_numeric("b__toxic", vec![0.6])
            .unwrap()
            .with_numeric("b__insult", vec![0.8])
            .unwrap();
        let labels = LabelMatrix::zeros(schema(), 1);

        let mut avg = WeightedAverage::flat(vec![1.0], true).with_models(["b"]);
        avg.fit(&frame, &labels).unwrap();
        let pred = avg.predict(&frame).unwrap();
        assert_eq!(pred.values()[[0, 1]], 0.8);
    }
}
