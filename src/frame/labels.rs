//! Label schema and label matrices

use crate::error::{Result, StackError};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// The six toxicity categories, in canonical order.
pub const TOXICITY_LABELS: [&str; 6] = [
    "toxic",
    "severe_toxic",
    "obscene",
    "threat",
    "insult",
    "identity_hate",
];

/// Fixed ordered list of target label names shared by every matrix
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelSchema {
    labels: Vec<String>,
}

impl LabelSchema {
    /// Create a schema from label names. Names must be unique and non-empty.
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(StackError::InvalidParameter {
                name: "labels".to_string(),
                value: "[]".to_string(),
                reason: "at least one label is required".to_string(),
            });
        }
        for (i, label) in labels.iter().enumerate() {
            if labels[..i].contains(label) {
                return Err(StackError::InvalidParameter {
                    name: "labels".to_string(),
                    value: label.clone(),
                    reason: "duplicate label".to_string(),
                });
            }
        }
        Ok(Self { labels })
    }

    /// Schema for the toxicity task
    pub fn toxicity() -> Self {
        Self {
            labels: TOXICITY_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.labels
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.position(label).is_some()
    }
}

impl Default for LabelSchema {
    fn default() -> Self {
        Self::toxicity()
    }
}

/// Row-aligned matrix of per-label values.
///
/// Holds binary ground truth during fit and probabilities during predict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMatrix {
    schema: LabelSchema,
    values: Array2<f64>,
}

impl LabelMatrix {
    /// Wrap a values array; column count must match the schema.
    pub fn new(schema: LabelSchema, values: Array2<f64>) -> Result<Self> {
        if values.ncols() != schema.len() {
            return Err(StackError::DimensionMismatch {
                expected: schema.len(),
                actual: values.ncols(),
            });
        }
        Ok(Self { schema, values })
    }

    pub fn zeros(schema: LabelSchema, n_rows: usize) -> Self {
        let n_labels = schema.len();
        Self {
            schema,
            values: Array2::zeros((n_rows, n_labels)),
        }
    }

    /// Assemble a matrix from per-label columns given in schema order
    pub fn from_columns(schema: LabelSchema, columns: Vec<Array1<f64>>) -> Result<Self> {
        if columns.len() != schema.len() {
            return Err(StackError::DimensionMismatch {
                expected: schema.len(),
                actual: columns.len(),
            });
        }
        let n_rows = columns.first().map(|c| c.len()).unwrap_or(0);
        let mut values = Array2::zeros((n_rows, columns.len()));
        for (j, column) in columns.iter().enumerate() {
            if column.len() != n_rows {
                return Err(StackError::ShapeMismatch {
                    expected: format!("{} rows", n_rows),
                    actual: format!("{} rows in column {}", column.len(), schema.names()[j]),
                });
            }
            values.column_mut(j).assign(column);
        }
        Ok(Self { schema, values })
    }

    pub fn schema(&self) -> &LabelSchema {
        &self.schema
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_labels(&self) -> usize {
        self.values.ncols()
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Array2<f64> {
        &mut self.values
    }

    pub fn into_values(self) -> Array2<f64> {
        self.values
    }

    pub fn column(&self, label_idx: usize) -> ArrayView1<'_, f64> {
        self.values.column(label_idx)
    }

    /// Column by label name
    pub fn label(&self, label: &str) -> Result<ArrayView1<'_, f64>> {
        let idx = self
            .schema
            .position(label)
            .ok_or_else(|| StackError::FeatureNotFound(label.to_string()))?;
        Ok(self.values.column(idx))
    }

    /// Rows at the given positions, in the given order
    pub fn take_rows(&self, indices: &[usize]) -> LabelMatrix {
        Self {
            schema: self.schema.clone(),
            values: self.values.select(Axis(0), indices),
        }
    }

    /// Write `block` rows into positions `indices` of this matrix
    pub fn scatter_rows(&mut self, indices: &[usize], block: &LabelMatrix) -> Result<()> {
        if block.n_rows() != indices.len() || block.n_labels() != self.n_labels() {
            return Err(StackError::ShapeMismatch {
                expected: format!("({}, {})", indices.len(), self.n_labels()),
                actual: format!("({}, {})", block.n_rows(), block.n_labels()),
            });
        }
        for (local, &global) in indices.iter().enumerate() {
            self.values.row_mut(global).assign(&block.values.row(local));
        }
        Ok(())
    }

    /// Arithmetic mean of several same-shaped matrices
    pub fn mean_of(matrices: &[LabelMatrix]) -> Result<LabelMatrix> {
        let first = matrices.first().ok_or_else(|| {
            StackError::InsufficientData("cannot average zero prediction matrices".to_string())
        })?;
        let mut sum = Array2::<f64>::zeros(first.values.raw_dim());
        for m in matrices {
            if m.values.raw_dim() != first.values.raw_dim() {
                return Err(StackError::ShapeMismatch {
                    expected: format!("{:?}", first.values.shape()),
                    actual: format!("{:?}", m.values.shape()),
                });
            }
            sum += &m.values;
        }
        sum /= matrices.len() as f64;
        Ok(Self {
            schema: first.schema.clone(),
            values: sum,
        })
    }
}
