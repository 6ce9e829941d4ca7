//! Out-of-fold prediction
//!
//! Every training row is predicted by a model that never saw it during
//! fitting. Test rows are predicted by each of the K fold models and the
//! K predictions are averaged.

pub mod folds;

pub use folds::{CvStrategy, FoldSplit, FoldSplitter};

use crate::error::{Result, StackError};
use crate::estimator::EstimatorFactory;
use crate::frame::{FeatureFrame, LabelMatrix};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Cooperative cancellation flag shared by every build of one invocation
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once `cancel` has been called
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(StackError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Predictions produced by one out-of-fold run
#[derive(Debug, Clone)]
pub struct OofPredictions {
    /// Row `i` predicts training row `i`
    pub train: LabelMatrix,
    pub train_ids: Vec<usize>,
    /// Mean of the fold models' test predictions
    pub test: LabelMatrix,
    pub test_ids: Vec<usize>,
    /// Test predictions of each fold model, in fold order
    pub fold_test: Vec<LabelMatrix>,
}

struct FoldOutcome {
    fold_idx: usize,
    held_out: Vec<usize>,
    oof: LabelMatrix,
    test: LabelMatrix,
}

/// Runs the K-fold procedure for one estimator factory
#[derive(Debug, Clone)]
pub struct OofRunner {
    splitter: FoldSplitter,
    parallel: bool,
    cancel: CancellationToken,
}

impl OofRunner {
    pub fn new(splitter: FoldSplitter) -> Self {
        Self {
            splitter,
            parallel: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Fit the folds concurrently on the rayon pool
    pub fn with_parallel_folds(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn splitter(&self) -> &FoldSplitter {
        &self.splitter
    }

    pub fn run(
        &self,
        factory: &EstimatorFactory,
        train: &FeatureFrame,
        labels: &LabelMatrix,
        test: &FeatureFrame,
    ) -> Result<OofPredictions> {
        if labels.n_rows() != train.n_rows() {
            return Err(StackError::DimensionMismatch {
                expected: train.n_rows(),
                actual: labels.n_rows(),
            });
        }
        self.cancel.check()?;

        let strata = match self.splitter.strategy() {
            CvStrategy::StratifiedKFold { label, .. } => Some(labels.label(label)?),
            CvStrategy::KFold { .. } => None,
        };
        let splits = self.splitter.split(train.n_rows(), strata)?;
        let start = Instant::now();

        let run_fold = |split: &FoldSplit| -> Result<FoldOutcome> {
            self.cancel.check()?;
            self.fit_fold(factory, split, train, labels, test)
        };
        let outcomes = if self.parallel {
            splits.par_iter().map(run_fold).collect::<Result<Vec<_>>>()?
        } else {
            splits.iter().map(run_fold).collect::<Result<Vec<_>>>()?
        };

        let mut oof = LabelMatrix::zeros(labels.schema().clone(), train.n_rows());
        let mut fold_test = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            oof.scatter_rows(&outcome.held_out, &outcome.oof)?;
            debug_assert_eq!(outcome.fold_idx, fold_test.len());
            fold_test.push(outcome.test);
        }
        let test_mean = LabelMatrix::mean_of(&fold_test)?;

        info!(
            folds = fold_test.len(),
            train_rows = train.n_rows(),
            test_rows = test.n_rows(),
            elapsed_secs = start.elapsed().as_secs_f64(),
            "out-of-fold predictions complete"
        );

        Ok(OofPredictions {
            train: oof,
            train_ids: train.row_ids().to_vec(),
            test: test_mean,
            test_ids: test.row_ids().to_vec(),
            fold_test,
        })
    }

    fn fit_fold(
        &self,
        factory: &EstimatorFactory,
        split: &FoldSplit,
        train: &FeatureFrame,
        labels: &LabelMatrix,
        test: &FeatureFrame,
    ) -> Result<FoldOutcome> {
        let fold_start = Instant::now();
        let mut estimator = factory();
        estimator.fit(
            &train.take_rows(&split.train_indices),
            &labels.take_rows(&split.train_indices),
        )?;

        let oof = estimator.predict(&train.take_rows(&split.test_indices))?;
        check_prediction(&oof, labels, split.test_indices.len())?;

        let test_pred = if test.n_rows() == 0 {
            LabelMatrix::zeros(labels.schema().clone(), 0)
        } else {
            estimator.predict(test)?
        };
        check_prediction(&test_pred, labels, test.n_rows())?;

        debug!(
            fold = split.fold_idx,
            train_rows = split.train_indices.len(),
            held_out = split.test_indices.len(),
            elapsed_secs = fold_start.elapsed().as_secs_f64(),
            "fold fitted"
        );

        Ok(FoldOutcome {
            fold_idx: split.fold_idx,
            held_out: split.test_indices.clone(),
            oof,
            test: test_pred,
        })
    }
}

fn check_prediction(pred: &LabelMatrix, labels: &LabelMatrix, rows: usize) -> Result<()> {
    if pred.schema() != labels.schema() || pred.n_rows() != rows {
        return Err(StackError::ShapeMismatch {
            expected: format!("({}, {:?})", rows, labels.schema().names()),
            actual: format!("({}, {:?})", pred.n_rows(), pred.schema().names()),
        });
    }
    Ok(())
}
