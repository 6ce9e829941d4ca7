//! Tabular feature frames
//!
//! A [`FeatureFrame`] is a table of examples by named columns. Every row
//! carries a stable example id; ids are the join key when dependency
//! predictions and feature sets are merged into a parent model's frame.

mod labels;

pub use labels::{LabelMatrix, LabelSchema, TOXICITY_LABELS};

use crate::error::{Result, StackError};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Separator between a column-group prefix and its suffix,
/// e.g. `lr2__toxic` or `comment_text__de`.
pub const COLUMN_SEPARATOR: &str = "__";

/// Name of the prediction column for `label` produced by `model`
pub fn prediction_column(model: &str, label: &str) -> String {
    format!("{}{}{}", model, COLUMN_SEPARATOR, label)
}

/// A single frame column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    /// Free text, one document per row
    Text(Vec<String>),
    /// Numeric values; NaN marks a missing value
    Numeric(Vec<f64>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Text(v) => v.len(),
            Column::Numeric(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Column::Numeric(_))
    }

    fn take(&self, indices: &[usize]) -> Column {
        match self {
            Column::Text(v) => Column::Text(indices.iter().map(|&i| v[i].clone()).collect()),
            Column::Numeric(v) => Column::Numeric(indices.iter().map(|&i| v[i]).collect()),
        }
    }
}

/// Table of examples (rows) by named columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureFrame {
    row_ids: Vec<usize>,
    names: Vec<String>,
    columns: Vec<Column>,
}

impl FeatureFrame {
    /// Empty frame over the given example ids
    pub fn new(row_ids: Vec<usize>) -> Self {
        Self {
            row_ids,
            names: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// Empty frame whose ids are `0..n_rows`
    pub fn with_row_count(n_rows: usize) -> Self {
        Self::new((0..n_rows).collect())
    }

    /// Add a text column (builder style)
    pub fn with_text<S: Into<String>>(mut self, name: S, values: Vec<String>) -> Result<Self> {
        self.insert(name, Column::Text(values))?;
        Ok(self)
    }

    /// Add a numeric column (builder style)
    pub fn with_numeric<S: Into<String>>(mut self, name: S, values: Vec<f64>) -> Result<Self> {
        self.insert(name, Column::Numeric(values))?;
        Ok(self)
    }

    pub fn n_rows(&self) -> usize {
        self.row_ids.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn row_ids(&self) -> &[usize] {
        &self.row_ids
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Iterate over `(name, column)` pairs in column order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.position(name)
            .map(|i| &self.columns[i])
            .ok_or_else(|| StackError::FeatureNotFound(name.to_string()))
    }

    pub fn text(&self, name: &str) -> Result<&[String]> {
        match self.column(name)? {
            Column::Text(v) => Ok(v),
            Column::Numeric(_) => Err(StackError::ShapeMismatch {
                expected: format!("text column '{}'", name),
                actual: "numeric column".to_string(),
            }),
        }
    }

    pub fn text_mut(&mut self, name: &str) -> Result<&mut Vec<String>> {
        let idx = self
            .position(name)
            .ok_or_else(|| StackError::FeatureNotFound(name.to_string()))?;
        match &mut self.columns[idx] {
            Column::Text(v) => Ok(v),
            Column::Numeric(_) => Err(StackError::ShapeMismatch {
                expected: format!("text column '{}'", name),
                actual: "numeric column".to_string(),
            }),
        }
    }

    pub fn numeric(&self, name: &str) -> Result<&[f64]> {
        match self.column(name)? {
            Column::Numeric(v) => Ok(v),
            Column::Text(_) => Err(StackError::ShapeMismatch {
                expected: format!("numeric column '{}'", name),
                actual: "text column".to_string(),
            }),
        }
    }

    /// Insert a column. A column with the same name is replaced in place.
    pub fn insert<S: Into<String>>(&mut self, name: S, column: Column) -> Result<()> {
        let name = name.into();
        if column.len() != self.n_rows() {
            return Err(StackError::ShapeMismatch {
                expected: format!("{} rows", self.n_rows()),
                actual: format!("{} rows in column '{}'", column.len(), name),
            });
        }
        match self.position(&name) {
            Some(idx) => self.columns[idx] = column,
            None => {
                self.names.push(name);
                self.columns.push(column);
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Column> {
        let idx = self.position(name)?;
        self.names.remove(idx);
        Some(self.columns.remove(idx))
    }

    /// Frame without the named columns. Every name must exist.
    pub fn drop_columns(&self, names: &[String]) -> Result<FeatureFrame> {
        if let Some(missing) = names.iter().find(|n| !self.contains(n)) {
            return Err(StackError::FeatureNotFound(missing.clone()));
        }
        let mut out = FeatureFrame::new(self.row_ids.clone());
        for (name, column) in self.iter() {
            if !names.iter().any(|n| n == name) {
                out.names.push(name.to_string());
                out.columns.push(column.clone());
            }
        }
        Ok(out)
    }

    /// Frame with only the named columns, in the requested order
    pub fn select_columns(&self, names: &[String]) -> Result<FeatureFrame> {
        let mut out = FeatureFrame::new(self.row_ids.clone());
        for name in names {
            out.insert(name.clone(), self.column(name)?.clone())?;
        }
        Ok(out)
    }

    /// Rows at the given positions (not ids), in the given order
    pub fn take_rows(&self, positions: &[usize]) -> FeatureFrame {
        FeatureFrame {
            row_ids: positions.iter().map(|&i| self.row_ids[i]).collect(),
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(positions)).collect(),
        }
    }

    /// Reorder rows so that ids follow `row_ids`. Every id must be present.
    pub fn align_to(&self, row_ids: &[usize]) -> Result<FeatureFrame> {
        if self.row_ids == row_ids {
            return Ok(self.clone());
        }
        let lookup: HashMap<usize, usize> = self
            .row_ids
            .iter()
            .enumerate()
            .map(|(pos, &id)| (id, pos))
            .collect();
        let positions = row_ids
            .iter()
            .map(|id| {
                lookup.get(id).copied().ok_or_else(|| {
                    StackError::Data(format!("example id {} missing from joined frame", id))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self.take_rows(&positions))
    }

    /// Column-join `other` on example id. Columns of `other` replace
    /// same-named columns of `self`.
    pub fn join(&mut self, other: &FeatureFrame) -> Result<()> {
        let aligned = other.align_to(&self.row_ids)?;
        for (name, column) in aligned.names.into_iter().zip(aligned.columns) {
            self.insert(name, column)?;
        }
        Ok(())
    }

    /// Column-join `other` on example id, failing on any name clash
    pub fn join_disjoint(&mut self, other: &FeatureFrame) -> Result<()> {
        if let Some(clash) = other.names.iter().find(|n| self.contains(n)) {
            return Err(StackError::InvalidParameter {
                name: "column".to_string(),
                value: clash.clone(),
                reason: "produced by more than one union branch".to_string(),
            });
        }
        self.join(other)
    }

    /// Add `model`'s predictions as `{model}__{label}` columns.
    ///
    /// `prediction_ids` are the example ids of the prediction rows; they are
    /// joined against this frame's ids.
    pub fn insert_predictions(
        &mut self,
        model: &str,
        prediction_ids: &[usize],
        predictions: &LabelMatrix,
    ) -> Result<()> {
        if prediction_ids.len() != predictions.n_rows() {
            return Err(StackError::ShapeMismatch {
                expected: format!("{} prediction rows", prediction_ids.len()),
                actual: format!("{} rows", predictions.n_rows()),
            });
        }
        let mut block = FeatureFrame::new(prediction_ids.to_vec());
        for (j, label) in predictions.schema().names().iter().enumerate() {
            block.insert(
                prediction_column(model, label),
                Column::Numeric(predictions.column(j).to_vec()),
            )?;
        }
        self.join(&block)
    }

    /// Names of numeric columns, in column order
    pub fn numeric_names(&self) -> Vec<String> {
        self.iter()
            .filter(|(_, c)| c.is_numeric())
            .map(|(n, _)| n.to_string())
            .collect()
    }

    /// Dense matrix of every numeric column, in column order.
    /// Text columns are ignored.
    pub fn numeric_matrix(&self) -> Array2<f64> {
        let numeric: Vec<&Vec<f64>> = self
            .columns
            .iter()
            .filter_map(|c| match c {
                Column::Numeric(v) => Some(v),
                Column::Text(_) => None,
            })
            .collect();
        let mut out = Array2::zeros((self.n_rows(), numeric.len()));
        for (j, values) in numeric.iter().enumerate() {
            for (i, &v) in values.iter().enumerate() {
                out[[i, j]] = v;
            }
        }
        out
    }
}
