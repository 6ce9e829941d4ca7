//! Evaluation of out-of-fold predictions

use crate::error::{Result, StackError};
use crate::frame::LabelMatrix;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// Area under the ROC curve, from average ranks (Mann-Whitney U).
///
/// `None` when `y_true` holds only one class.
pub fn roc_auc(y_true: ArrayView1<'_, f64>, scores: ArrayView1<'_, f64>) -> Option<f64> {
    let n = y_true.len();
    if n != scores.len() {
        return None;
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    // Tied scores share the mean of their ranks
    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }

    let n_pos = y_true.iter().filter(|&&y| y > 0.5).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }
    let rank_sum: f64 = (0..n).filter(|&i| y_true[i] > 0.5).map(|i| ranks[i]).sum();
    let u = rank_sum - (n_pos * (n_pos + 1)) as f64 / 2.0;
    Some(u / (n_pos * n_neg) as f64)
}

/// Per-label AUC and their mean
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScores {
    /// `(label, auc)`; `None` for labels with a single class
    pub per_label: Vec<(String, Option<f64>)>,
    /// Mean over the labels that have a score
    pub mean: Option<f64>,
}

pub fn label_scores(truth: &LabelMatrix, predictions: &LabelMatrix) -> Result<LabelScores> {
    if truth.schema() != predictions.schema() {
        return Err(StackError::ShapeMismatch {
            expected: format!("{:?}", truth.schema().names()),
            actual: format!("{:?}", predictions.schema().names()),
        });
    }
    if truth.n_rows() != predictions.n_rows() {
        return Err(StackError::DimensionMismatch {
            expected: truth.n_rows(),
            actual: predictions.n_rows(),
        });
    }
    let per_label: Vec<(String, Option<f64>)> = truth
        .schema()
        .names()
        .iter()
        .enumerate()
        .map(|(j, label)| (label.clone(), roc_auc(truth.column(j), predictions.column(j))))
        .collect();
    let scored: Vec<f64> = per_label.iter().filter_map(|(_, s)| *s).collect();
    let mean = if scored.is_empty() {
        None
    } else {
        Some(scored.iter().sum::<f64>() / scored.len() as f64)
    };
    Ok(LabelScores { per_label, mean })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_roc_auc() {
        let y = array![0.0, 0.0, 1.0, 1.0];
        assert_eq!(roc_auc(y.view(), array![0.1, 0.4, 0.35, 0.8].view()), Some(0.75));
        assert_eq!(roc_auc(y.view(), array![0.1, 0.2, 0.3, 0.4].view()), Some(1.0));
        // All tied
        assert_eq!(roc_auc(y.view(), array![0.5, 0.5, 0.5, 0.5].view()), Some(0.5));
        assert_eq!(roc_auc(array![1.0, 1.0].view(), array![0.1, 0.2].view()), None);
    }
}
