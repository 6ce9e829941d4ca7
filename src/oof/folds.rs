//! K-fold partitioning of training rows

use crate::error::{Result, StackError};
use ndarray::ArrayView1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fold partitioning strategy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CvStrategy {
    /// Contiguous folds, optionally shuffled first
    KFold { shuffle: bool },
    /// Folds keep the positive rate of one label roughly constant
    StratifiedKFold { label: String, shuffle: bool },
}

impl Default for CvStrategy {
    fn default() -> Self {
        CvStrategy::KFold { shuffle: true }
    }
}

/// A single train/held-out split, as positions into the training frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Deterministic fold splitter
#[derive(Debug, Clone)]
pub struct FoldSplitter {
    n_folds: usize,
    strategy: CvStrategy,
    seed: u64,
}

impl FoldSplitter {
    pub fn new(n_folds: usize, strategy: CvStrategy) -> Self {
        Self {
            n_folds,
            strategy,
            seed: 0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn n_folds(&self) -> usize {
        self.n_folds
    }

    pub fn strategy(&self) -> &CvStrategy {
        &self.strategy
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Partition `n_samples` rows into folds.
    ///
    /// `strata` is the label column used by `StratifiedKFold`; it is ignored
    /// by the other strategies. Every fold is non-empty and every row lands in
    /// exactly one held-out fold.
    pub fn split(&self, n_samples: usize, strata: Option<ArrayView1<'_, f64>>) -> Result<Vec<FoldSplit>> {
        if self.n_folds < 2 {
            return Err(StackError::InsufficientData(format!(
                "n_folds must be at least 2, got {}",
                self.n_folds
            )));
        }
        if n_samples < self.n_folds {
            return Err(StackError::InsufficientData(format!(
                "{} rows cannot fill {} folds",
                n_samples, self.n_folds
            )));
        }

        let folds = match &self.strategy {
            CvStrategy::KFold { shuffle } => self.k_fold(n_samples, *shuffle),
            CvStrategy::StratifiedKFold { label, shuffle } => {
                let y = strata.ok_or_else(|| StackError::FeatureNotFound(label.clone()))?;
                if y.len() != n_samples {
                    return Err(StackError::DimensionMismatch {
                        expected: n_samples,
                        actual: y.len(),
                    });
                }
                self.stratified_k_fold(y, *shuffle)
            }
        };

        if let Some(empty) = folds.iter().position(Vec::is_empty) {
            return Err(StackError::InsufficientData(format!("fold {} is empty", empty)));
        }

        Ok(Self::into_splits(folds))
    }

    fn k_fold(&self, n_samples: usize, shuffle: bool) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
            indices.shuffle(&mut rng);
        }

        let base = n_samples / self.n_folds;
        let remainder = n_samples % self.n_folds;

        let mut folds = Vec::with_capacity(self.n_folds);
        let mut current = 0;
        for fold_idx in 0..self.n_folds {
            let fold_size = if fold_idx < remainder { base + 1 } else { base };
            folds.push(indices[current..current + fold_size].to_vec());
            current += fold_size;
        }
        folds
    }

    fn stratified_k_fold(&self, y: ArrayView1<'_, f64>, shuffle: bool) -> Vec<Vec<usize>> {
        // BTreeMap keeps class order stable across runs
        let mut class_indices: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (idx, &val) in y.iter().enumerate() {
            class_indices.entry(val.round() as i64).or_default().push(idx);
        }

        if shuffle {
            let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
            for indices in class_indices.values_mut() {
                indices.shuffle(&mut rng);
            }
        }

        // Deal round-robin, continuing across classes so small classes do not
        // all pile into the first folds.
        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); self.n_folds];
        let mut next = 0;
        for indices in class_indices.values() {
            for &idx in indices {
                folds[next % self.n_folds].push(idx);
                next += 1;
            }
        }
        for fold in &mut folds {
            fold.sort_unstable();
        }
        folds
    }

    fn into_splits(folds: Vec<Vec<usize>>) -> Vec<FoldSplit> {
        (0..folds.len())
            .map(|fold_idx| FoldSplit {
                test_indices: folds[fold_idx].clone(),
                train_indices: folds
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != fold_idx)
                    .flat_map(|(_, f)| f.iter().copied())
                    .collect(),
                fold_idx,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    #[test]
    fn test_k_fold_covers_every_row_once() {
        let splitter = FoldSplitter::new(5, CvStrategy::KFold { shuffle: true }).with_seed(7);
        let splits = splitter.split(103, None).unwrap();
        assert_eq!(splits.len(), 5);

        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..103).collect::<Vec<_>>());

        for split in &splits {
            assert_eq!(split.test_indices.len() + split.train_indices.len(), 103);
            for idx in &split.test_indices {
                assert!(!split.train_indices.contains(idx));
            }
        }
    }

    #[test]
    fn test_k_fold_is_deterministic() {
        let a = FoldSplitter::new(4, CvStrategy::KFold { shuffle: true }).with_seed(3);
        let b = FoldSplitter::new(4, CvStrategy::KFold { shuffle: true }).with_seed(3);
        assert_eq!(a.split(40, None).unwrap(), b.split(40, None).unwrap());
    }

    #[test]
    fn test_too_few_folds_or_rows() {
        let one = FoldSplitter::new(1, CvStrategy::default());
        assert!(matches!(one.split(10, None), Err(StackError::InsufficientData(_))));

        let five = FoldSplitter::new(5, CvStrategy::default());
        assert!(matches!(five.split(3, None), Err(StackError::InsufficientData(_))));
    }

    #[test]
    fn test_stratified_balances_positives() {
        let y = Array1::from_vec(vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0]);
        let splitter = FoldSplitter::new(
            2,
            CvStrategy::StratifiedKFold {
                label: "toxic".into(),
                shuffle: false,
            },
        );
        let splits = splitter.split(10, Some(y.view())).unwrap();
        for split in &splits {
            let positives = split.test_indices.iter().filter(|&&i| y[i] > 0.5).count();
            assert_eq!(positives, 2);
        }
    }

    #[test]
    fn test_stratified_requires_strata() {
        let splitter = FoldSplitter::new(
            2,
            CvStrategy::StratifiedKFold {
                label: "toxic".into(),
                shuffle: false,
            },
        );
        assert!(matches!(splitter.split(10, None), Err(StackError::FeatureNotFound(_))));
    }
}
