//! Seed bagging

use super::average_blocks;
use crate::error::{Result, StackError};
use crate::estimator::{Estimator, EstimatorFactory, EstimatorKind};
use crate::frame::{FeatureFrame, LabelMatrix};
use rayon::prelude::*;
use tracing::debug;

/// `n` copies of an estimator that differ only in seed; predictions are
/// their arithmetic mean. Members are fitted in parallel.
pub struct Bagged {
    n: usize,
    seed: u64,
    factory: EstimatorFactory,
    members: Vec<Box<dyn Estimator>>,
}

impl Bagged {
    pub fn new(n: usize, factory: EstimatorFactory) -> Self {
        Self {
            n,
            seed: 0,
            factory,
            members: Vec::new(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn n_members(&self) -> usize {
        self.n
    }
}

impl Estimator for Bagged {
    fn fit(&mut self, frame: &FeatureFrame, labels: &LabelMatrix) -> Result<()> {
        if self.n == 0 {
            return Err(StackError::InvalidParameter {
                name: "n".to_string(),
                value: "0".to_string(),
                reason: "bagging needs at least one member".to_string(),
            });
        }

        let mut members: Vec<Box<dyn Estimator>> = (0..self.n)
            .map(|i| {
                let mut member = (self.factory)();
                member.reseed(self.seed.wrapping_add(i as u64));
                member
            })
            .collect();

        members
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(i, member)| {
                debug!(member = i, "fitting bagged member");
                member.fit(frame, labels)
            })?;

        self.members = members;
        Ok(())
    }

    fn predict(&self, frame: &FeatureFrame) -> Result<LabelMatrix> {
        if self.members.is_empty() {
            return Err(StackError::NotFitted);
        }
        let predictions = self
            .members
            .iter()
            .map(|m| m.predict(frame))
            .collect::<Result<Vec<_>>>()?;
        average_blocks(&predictions)
    }

    fn kind(&self) -> EstimatorKind {
        EstimatorKind::Composite
    }

    fn reseed(&mut self, seed: u64) {
        self.seed = seed;
    }

    fn describe(&self) -> String {
        format!("bagged(n={}, seed={})[{}]", self.n, self.seed, (self.factory)().describe())
    }
}
