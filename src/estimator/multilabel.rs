//! One binary learner per label

use super::{Estimator, EstimatorKind};
use crate::error::{Result, StackError};
use crate::frame::{FeatureFrame, LabelMatrix, LabelSchema};
use crate::learners::{
    default_rounds, BinaryClassifier, BoostingConfig, FeatureSelector, GradientBoostingClassifier,
    LogisticRegression, SelectionMethod,
};
use ndarray::Array1;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::debug;

/// Creates the binary learner for the named label
pub type ClassifierFactory = Arc<dyn Fn(&str) -> Box<dyn BinaryClassifier> + Send + Sync>;

struct LabelModel {
    selector: Option<FeatureSelector>,
    classifier: Box<dyn BinaryClassifier>,
}

struct Fitted {
    schema: LabelSchema,
    feature_names: Vec<String>,
    per_label: Vec<LabelModel>,
}

/// Multi-label adapter over a binary learner.
///
/// Fits one learner per label on the frame's numeric columns, keeping label
/// order. Text columns are ignored, so text must be vectorised upstream. An
/// optional selector is fitted per label on that label's training rows only.
pub struct MultiLabel {
    kind: EstimatorKind,
    description: String,
    make: ClassifierFactory,
    selection: Option<SelectionMethod>,
    seed: u64,
    fitted: Option<Fitted>,
}

impl MultiLabel {
    pub fn new<S: Into<String>>(kind: EstimatorKind, description: S, make: ClassifierFactory) -> Self {
        Self {
            kind,
            description: description.into(),
            make,
            selection: None,
            seed: 0,
            fitted: None,
        }
    }

    /// Same logistic configuration for every label
    pub fn logistic(template: LogisticRegression) -> Self {
        let description = template.describe();
        Self::new(
            EstimatorKind::Linear,
            description,
            Arc::new(move |_label: &str| Box::new(template.clone()) as Box<dyn BinaryClassifier>),
        )
    }

    /// Boosted trees; with `per_label_rounds` the round count follows
    /// [`default_rounds`] for each label.
    pub fn boosting(config: BoostingConfig, per_label_rounds: bool) -> Self {
        let description = format!(
            "{} per_label_rounds={}",
            GradientBoostingClassifier::new(config.clone()).describe(),
            per_label_rounds
        );
        Self::new(
            EstimatorKind::TreeEnsemble,
            description,
            Arc::new(move |label: &str| {
                let mut config = config.clone();
                if per_label_rounds {
                    config.n_estimators = default_rounds(label);
                }
                Box::new(GradientBoostingClassifier::new(config)) as Box<dyn BinaryClassifier>
            }),
        )
    }

    pub fn with_selection(mut self, method: SelectionMethod) -> Self {
        self.selection = Some(method);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

impl Estimator for MultiLabel {
    fn fit(&mut self, frame: &FeatureFrame, labels: &LabelMatrix) -> Result<()> {
        if frame.n_rows() != labels.n_rows() {
            return Err(StackError::DimensionMismatch {
                expected: frame.n_rows(),
                actual: labels.n_rows(),
            });
        }
        let feature_names = frame.numeric_names();
        if feature_names.is_empty() {
            return Err(StackError::InsufficientData(
                "frame has no numeric columns to learn from".to_string(),
            ));
        }
        let x = frame.numeric_matrix();
        let schema = labels.schema().clone();

        let per_label = schema
            .names()
            .par_iter()
            .enumerate()
            .map(|(j, label)| -> Result<LabelModel> {
                let y: Array1<f64> = labels.column(j).to_owned();

                let (selector, x_label) = match &self.selection {
                    Some(method) => {
                        let mut selector = FeatureSelector::new(method.clone());
                        selector.fit(&x, &y)?;
                        let x_sel = selector.transform(&x)?;
                        debug!(
                            label = %label,
                            selected = x_sel.ncols(),
                            total = x.ncols(),
                            "per-label feature selection"
                        );
                        (Some(selector), x_sel)
                    }
                    None => (None, x.clone()),
                };

                let mut classifier = (self.make)(label);
                classifier.reseed(self.seed.wrapping_add(j as u64));
                classifier.fit(&x_label, &y)?;
                Ok(LabelModel { selector, classifier })
            })
            .collect::<Result<Vec<_>>>()?;

        self.fitted = Some(Fitted {
            schema,
            feature_names,
            per_label,
        });
        Ok(())
    }

    fn predict(&self, frame: &FeatureFrame) -> Result<LabelMatrix> {
        let fitted = self.fitted.as_ref().ok_or(StackError::NotFitted)?;
        // Align columns by name so column order at predict time does not matter
        let x = frame.select_columns(&fitted.feature_names)?.numeric_matrix();

        let columns = fitted
            .per_label
            .iter()
            .map(|m| match &m.selector {
                Some(selector) => m.classifier.predict_proba(&selector.transform(&x)?),
                None => m.classifier.predict_proba(&x),
            })
            .collect::<Result<Vec<_>>>()?;

        LabelMatrix::from_columns(fitted.schema.clone(), columns)
    }

    fn kind(&self) -> EstimatorKind {
        self.kind
    }

    fn reseed(&mut self, seed: u64) {
        self.seed = seed;
    }

    fn describe(&self) -> String {
        match &self.selection {
            Some(method) => format!(
                "multilabel[{} | {}]",
                FeatureSelector::new(method.clone()).describe(),
                self.description
            ),
            None => format!("multilabel[{}]", self.description),
        }
    }
}
