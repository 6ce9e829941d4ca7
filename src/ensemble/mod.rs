//! Aggregation operators
//!
//! Operators that combine the prediction blocks of sibling models:
//! - Simple and weighted averaging
//! - Grouped averaging (one averaged block per named group)
//! - Bagging over seeds
//!
//! A prediction block is the set of `{model}__{label}` columns one upstream
//! model contributed to a frame.

mod average;
mod bagged;
mod grouped;

pub use average::{SimpleAverage, WeightedAverage, Weights};
pub use bagged::Bagged;
pub use grouped::{GroupSpec, GroupedAverage};

use crate::error::{Result, StackError};
use crate::frame::{prediction_column, FeatureFrame, LabelMatrix, LabelSchema, COLUMN_SEPARATOR};
use ndarray::{Array1, Axis};

/// Upstream models with prediction columns in `frame`, in first-appearance order.
///
/// A column counts as a prediction column when it is numeric and its name is
/// `{model}__{label}` for a label of `schema`. Other columns are ignored.
pub fn discover_models(frame: &FeatureFrame, schema: &LabelSchema) -> Vec<String> {
    let mut models: Vec<String> = Vec::new();
    for (name, column) in frame.iter() {
        if !column.is_numeric() {
            continue;
        }
        // Longest label wins, so `m__severe_toxic` is never read as a `toxic` column
        let matched = schema
            .names()
            .iter()
            .filter_map(|label| {
                name.strip_suffix(label.as_str())
                    .and_then(|prefix| prefix.strip_suffix(COLUMN_SEPARATOR))
                    .filter(|model| !model.is_empty())
                    .map(|model| (label.len(), model))
            })
            .max_by_key(|(len, _)| *len);
        if let Some((_, model)) = matched {
            if !models.iter().any(|m| m == model) {
                models.push(model.to_string());
            }
        }
    }
    models
}

/// The full prediction block of `model`, in schema label order
pub fn model_block(frame: &FeatureFrame, model: &str, schema: &LabelSchema) -> Result<LabelMatrix> {
    let columns = schema
        .names()
        .iter()
        .map(|label| {
            frame
                .numeric(&prediction_column(model, label))
                .map(|v| Array1::from(v.to_vec()))
        })
        .collect::<Result<Vec<_>>>()?;
    LabelMatrix::from_columns(schema.clone(), columns)
}

/// Blocks of every discovered model, in discovery order
pub fn prediction_blocks(frame: &FeatureFrame, schema: &LabelSchema) -> Result<Vec<(String, LabelMatrix)>> {
    discover_models(frame, schema)
        .into_iter()
        .map(|model| {
            let block = model_block(frame, &model, schema)?;
            Ok((model, block))
        })
        .collect()
}

/// Element-wise arithmetic mean of same-shaped blocks.
///
/// One block is returned unchanged.
pub fn average_blocks(blocks: &[LabelMatrix]) -> Result<LabelMatrix> {
    match blocks {
        [] => Err(StackError::InsufficientData(
            "no prediction blocks to average".to_string(),
        )),
        [single] => Ok(single.clone()),
        many => {
            let first = &many[0];
            let mut stacked = ndarray::Array3::<f64>::zeros((many.len(), first.n_rows(), first.n_labels()));
            for (k, block) in many.iter().enumerate() {
                if block.values().dim() != first.values().dim() {
                    return Err(StackError::ShapeMismatch {
                        expected: format!("{:?}", first.values().shape()),
                        actual: format!("{:?}", block.values().shape()),
                    });
                }
                stacked.index_axis_mut(Axis(0), k).assign(block.values());
            }
            let mean = stacked
                .mean_axis(Axis(0))
                .ok_or_else(|| StackError::InsufficientData("empty stack".to_string()))?;
            LabelMatrix::new(first.schema().clone(), mean)
        }
    }
}
