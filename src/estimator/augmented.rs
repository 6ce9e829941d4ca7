//! Estimator wrapper with train- and predict-time augmentation

use super::{Estimator, EstimatorKind};
use crate::augment::{Augmentation, AugmentedBatch};
use crate::ensemble::average_blocks;
use crate::error::{Result, StackError};
use crate::frame::{FeatureFrame, LabelMatrix};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

/// Applies train augmentations once before fitting, and averages the
/// predictions of `predict_passes` independently augmented copies of the
/// input at predict time.
pub struct AugmentedEstimator {
    inner: Box<dyn Estimator>,
    train: Vec<Box<dyn Augmentation>>,
    predict: Vec<Box<dyn Augmentation>>,
    predict_passes: usize,
    seed: u64,
}

impl AugmentedEstimator {
    pub fn new<E: Estimator + 'static>(inner: E) -> Self {
        Self {
            inner: Box::new(inner),
            train: Vec::new(),
            predict: Vec::new(),
            predict_passes: 1,
            seed: 0,
        }
    }

    pub fn with_train_augmentation<A: Augmentation + 'static>(mut self, augmentation: A) -> Self {
        self.train.push(Box::new(augmentation));
        self
    }

    pub fn with_predict_augmentation<A: Augmentation + 'static>(mut self, augmentation: A) -> Self {
        self.predict.push(Box::new(augmentation));
        self
    }

    pub fn with_train_augmentations(mut self, augmentations: Vec<Box<dyn Augmentation>>) -> Self {
        self.train.extend(augmentations);
        self
    }

    pub fn with_predict_augmentations(mut self, augmentations: Vec<Box<dyn Augmentation>>) -> Self {
        self.predict.extend(augmentations);
        self
    }

    pub fn with_predict_passes(mut self, passes: usize) -> Self {
        self.predict_passes = passes;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn augment(
        augmentations: &[Box<dyn Augmentation>],
        mut batch: AugmentedBatch,
        rng: &mut ChaCha8Rng,
    ) -> Result<AugmentedBatch> {
        for augmentation in augmentations {
            batch = augmentation.apply(batch, rng)?;
        }
        Ok(batch)
    }
}

impl Estimator for AugmentedEstimator {
    fn fit(&mut self, frame: &FeatureFrame, labels: &LabelMatrix) -> Result<()> {
        if self.train.is_empty() {
            return self.inner.fit(frame, labels);
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let batch = AugmentedBatch::new(frame.clone(), Some(labels.clone()));
        let batch = Self::augment(&self.train, batch, &mut rng)?;
        let labels = batch
            .labels
            .ok_or_else(|| StackError::Data("augmentation dropped the training labels".to_string()))?;
        self.inner.fit(&batch.frame, &labels)
    }

    fn predict(&self, frame: &FeatureFrame) -> Result<LabelMatrix> {
        if self.predict.is_empty() || self.predict_passes == 0 {
            return self.inner.predict(frame);
        }
        let passes = (0..self.predict_passes)
            .map(|pass| {
                // Each pass has its own stream, disjoint from the training one
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(1 + pass as u64));
                let batch = Self::augment(&self.predict, AugmentedBatch::unlabeled(frame.clone()), &mut rng)?;
                self.inner.predict(&batch.frame)
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(passes = passes.len(), "averaged augmented predictions");
        average_blocks(&passes)
    }

    fn kind(&self) -> EstimatorKind {
        EstimatorKind::Composite
    }

    fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.inner.reseed(seed);
    }

    fn describe(&self) -> String {
        let train: Vec<String> = self.train.iter().map(|a| a.describe()).collect();
        let predict: Vec<String> = self.predict.iter().map(|a| a.describe()).collect();
        format!(
            "augmented(train=[{}], predict=[{}], passes={}, seed={})[{}]",
            train.join(","),
            predict.join(","),
            self.predict_passes,
            self.seed,
            self.inner.describe()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::augment::{RandomCrop, TEXT_COLUMN};
    use crate::frame::LabelSchema;
    use ndarray::Array2;

    /// Predicts the token count of each text plus the number of tokens it
    /// was trained on, for every label
    struct TokenCounter {
        schema: Option<LabelSchema>,
        seen: Vec<String>,
    }

    impl Estimator for TokenCounter {
        fn fit(&mut self, frame: &FeatureFrame, labels: &LabelMatrix) -> Result<()> {
            self.schema = Some(labels.schema().clone());
            self.seen = frame.text(TEXT_COLUMN)?.to_vec();
            Ok(())
        }

        fn predict(&self, frame: &FeatureFrame) -> Result<LabelMatrix> {
            let schema = self.schema.clone().ok_or(StackError::NotFitted)?;
            let texts = frame.text(TEXT_COLUMN)?;
            let trained: usize = self.seen.iter().map(|t| t.split_whitespace().count()).sum();
            let mut values = Array2::zeros((texts.len(), schema.len()));
            for (i, t) in texts.iter().enumerate() {
                values.row_mut(i).fill((t.split_whitespace().count() + trained) as f64);
            }
            LabelMatrix::new(schema, values)
        }

        fn kind(&self) -> EstimatorKind {
            EstimatorKind::Neural
        }

        fn describe(&self) -> String {
            "token_counter".to_string()
        }
    }

    fn data() -> (FeatureFrame, LabelMatrix) {
        let frame = FeatureFrame::with_row_count(2)
            .with_text(TEXT_COLUMN, vec!["a b c d e f g h".into(), "x y z w".into()])
            .unwrap();
        (frame, LabelMatrix::zeros(LabelSchema::new(["toxic"]).unwrap(), 2))
    }

    #[test]
    fn test_predict_passes_average() {
        let (frame, labels) = data();
        let mut model = AugmentedEstimator::new(TokenCounter { schema: None, seen: vec![] })
            .with_predict_augmentation(RandomCrop::new(0.5, 0.5))
            .with_predict_passes(3);
        model.fit(&frame, &labels).unwrap();
        let pred = model.predict(&frame).unwrap();
        // 12 training tokens, then half of each text
        assert_eq!(pred.values()[[0, 0]], 16.0);
        assert_eq!(pred.values()[[1, 0]], 14.0);
    }

    #[test]
    fn test_train_augmentation_is_seeded() {
        let (frame, labels) = data();
        let build = || {
            AugmentedEstimator::new(TokenCounter { schema: None, seen: vec![] })
                .with_train_augmentation(RandomCrop::new(1usize, 3usize))
                .with_seed(9)
        };
        let mut a = build();
        let mut b = build();
        a.fit(&frame, &labels).unwrap();
        b.fit(&frame, &labels).unwrap();
        let pa = a.predict(&frame).unwrap();
        assert_eq!(pa, b.predict(&frame).unwrap());
        // Cropped to at most 3 tokens per row
        assert!(pa.values()[[1, 0]] <= 4.0 + 6.0);
        assert!(pa.values()[[1, 0]] >= 4.0 + 2.0);
    }
}
