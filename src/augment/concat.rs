//! Pairwise text concatenation

use super::{Augmentation, AugmentedBatch, TEXT_COLUMN};
use crate::error::{Result, StackError};
use rand::{Rng, RngCore};

/// With probability `prob`, appends the text of another row of the batch,
/// drawn uniformly, to a row's text.
///
/// When the batch carries labels, the row's labels become the element-wise
/// maximum of both rows, so a toxic partner makes the result toxic. Partners
/// are read from the batch as it was before this transform ran.
#[derive(Debug, Clone)]
pub struct RandomConcat {
    prob: f64,
    text_column: String,
}

impl RandomConcat {
    pub fn new(prob: f64) -> Self {
        Self {
            prob,
            text_column: TEXT_COLUMN.to_string(),
        }
    }

    pub fn with_text_column<S: Into<String>>(mut self, column: S) -> Self {
        self.text_column = column.into();
        self
    }
}

impl Augmentation for RandomConcat {
    fn apply(&self, mut batch: AugmentedBatch, rng: &mut dyn RngCore) -> Result<AugmentedBatch> {
        if !(0.0..=1.0).contains(&self.prob) {
            return Err(StackError::InvalidParameter {
                name: "prob".to_string(),
                value: self.prob.to_string(),
                reason: "must lie in [0, 1]".to_string(),
            });
        }
        let n = batch.frame.n_rows();
        if n < 2 {
            return Ok(batch);
        }

        let original: Vec<String> = batch.frame.text(&self.text_column)?.to_vec();
        let original_labels = batch.labels.clone();

        let mut pairs = Vec::new();
        for row in 0..n {
            let r: f64 = rng.gen();
            // Uniform over the other n - 1 rows
            let mut partner = rng.gen_range(0..n - 1);
            if partner >= row {
                partner += 1;
            }
            if r < self.prob {
                pairs.push((row, partner));
            }
        }

        let texts = batch.frame.text_mut(&self.text_column)?;
        for &(row, partner) in &pairs {
            texts[row] = format!("{} {}", original[row], original[partner]);
        }

        if let (Some(labels), Some(before)) = (batch.labels.as_mut(), original_labels.as_ref()) {
            let values = labels.values_mut();
            for &(row, partner) in &pairs {
                for j in 0..values.ncols() {
                    values[[row, j]] = before.values()[[row, j]].max(before.values()[[partner, j]]);
                }
            }
        }

        Ok(batch)
    }

    fn describe(&self) -> String {
        format!("random_concat(p={})", self.prob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FeatureFrame, LabelMatrix, LabelSchema};
    use ndarray::array;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_concat_merges_labels() {
        let frame = FeatureFrame::with_row_count(2)
            .with_text(TEXT_COLUMN, vec!["nice".into(), "idiot".into()])
            .unwrap();
        let labels = LabelMatrix::new(LabelSchema::new(["toxic"]).unwrap(), array![[0.0], [1.0]]).unwrap();

        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let out = RandomConcat::new(1.0)
            .apply(AugmentedBatch::new(frame, Some(labels)), &mut rng)
            .unwrap();

        assert_eq!(out.frame.text(TEXT_COLUMN).unwrap(), &["nice idiot", "idiot nice"]);
        let labels = out.labels.unwrap();
        assert_eq!(labels.values()[[0, 0]], 1.0);
        assert_eq!(labels.values()[[1, 0]], 1.0);
    }

    #[test]
    fn test_zero_probability_is_identity() {
        let frame = FeatureFrame::with_row_count(3)
            .with_text(TEXT_COLUMN, vec!["a".into(), "b".into(), "c".into()])
            .unwrap();
        let batch = AugmentedBatch::unlabeled(frame);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let out = RandomConcat::new(0.0).apply(batch.clone(), &mut rng).unwrap();
        assert_eq!(out, batch);
    }
}
