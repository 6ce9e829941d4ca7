//! Ready-made model registry for the six-label toxicity task
//!
//! Three levels:
//! - level 1 reads text (and optional feature sets) directly
//! - level 2 stacks on level-1 out-of-fold predictions
//! - level 3 blends level-2 models
//!
//! Level-1 models only need `train.csv`/`test.csv`. Models declaring feature
//! sets (`num1`, `multilang`) need the matching `{tag}_train.csv` and
//! `{tag}_test.csv` files.

use crate::augment::{RandomConcat, RandomCrop, RandomTranslation, TEXT_COLUMN};
use crate::ensemble::{Bagged, GroupSpec, SimpleAverage, WeightedAverage, Weights};
use crate::estimator::{factory, AugmentedEstimator, MultiLabel, Pipeline, PipelineNode};
use crate::estimator::pipeline::{DropColumns, FillMissing, GroupAverage, OnColumn};
use crate::learners::{BoostingConfig, LogisticRegression, SelectionMethod};
use crate::registry::{ModelRegistry, ModelSpec, RegistryBuilder};
use crate::text::TfidfConfig;
use ndarray::array;

/// Level-1 models, in build order
pub const LEVEL1: [&str; 6] = [
    "lr_word",
    "lr_word_char",
    "lr_word_char_num",
    "gbt_word",
    "lr_word_aug",
    "lr_multilang_aug",
];

fn word_tfidf() -> PipelineNode {
    PipelineNode::step(OnColumn::tfidf(TEXT_COLUMN, TfidfConfig::words().with_max_features(10_000)))
}

fn char_tfidf() -> PipelineNode {
    PipelineNode::step(OnColumn::tfidf(
        TEXT_COLUMN,
        TfidfConfig::chars(2, 6).with_max_features(50_000),
    ))
}

fn word_lr() -> Pipeline {
    Pipeline::new(word_tfidf(), MultiLabel::logistic(LogisticRegression::new()))
}

fn level2_boosting() -> BoostingConfig {
    BoostingConfig::default()
        .with_learning_rate(0.02)
        .with_max_depth(3)
        .with_validation_fraction(0.1)
}

fn level1_groups() -> GroupSpec {
    GroupSpec::new()
        .group("lr", ["lr_word", "lr_word_char", "lr_word_char_num"])
        .group("gbt", ["gbt_word"])
        .group("aug", ["lr_word_aug", "lr_multilang_aug"])
}

/// Register every level-1 model
pub fn register_level1(builder: &mut RegistryBuilder) {
    builder.register(ModelSpec::new("lr_word", word_lr));

    builder.register(ModelSpec::new("lr_word_char", || {
        Pipeline::new(
            PipelineNode::union(vec![word_tfidf(), char_tfidf()]),
            MultiLabel::logistic(LogisticRegression::new()),
        )
    }));

    builder.register(
        ModelSpec::new("lr_word_char_num", || {
            Pipeline::new(
                PipelineNode::union(vec![
                    word_tfidf(),
                    char_tfidf(),
                    PipelineNode::sequence(vec![
                        PipelineNode::step(DropColumns::new([TEXT_COLUMN])),
                        PipelineNode::step(FillMissing(0.0)),
                    ]),
                ]),
                MultiLabel::logistic(LogisticRegression::new()),
            )
        })
        .with_features(["num1"]),
    );

    builder.register(ModelSpec::new("gbt_word", || {
        Pipeline::new(
            PipelineNode::step(OnColumn::tfidf(TEXT_COLUMN, TfidfConfig::words().with_max_features(2_000))),
            MultiLabel::boosting(BoostingConfig::default().with_learning_rate(0.1), true).with_selection(
                SelectionMethod::CoefficientThreshold {
                    threshold: 0.2,
                    alpha: 1.0,
                },
            ),
        )
    }));

    builder.register(ModelSpec::new("lr_word_aug", || {
        AugmentedEstimator::new(word_lr())
            .with_train_augmentation(RandomCrop::new(0.5, 100usize))
            .with_train_augmentation(RandomConcat::new(0.05))
            .with_predict_augmentation(RandomCrop::new(0.5, 100usize))
            .with_predict_passes(2)
            .with_seed(1)
    }));

    builder.register(
        ModelSpec::new("lr_multilang_aug", || {
            AugmentedEstimator::new(word_lr())
                .with_train_augmentation(RandomTranslation::new(0.5))
                .with_train_augmentation(RandomCrop::new(0.5, 200usize))
                .with_seed(2)
        })
        .with_features(["multilang"]),
    );
}

/// Register the level-2 stackers over every level-1 model
pub fn register_level2(builder: &mut RegistryBuilder) {
    builder.register(
        ModelSpec::new("l2_avg", || {
            Pipeline::new(
                PipelineNode::step(DropColumns::new([TEXT_COLUMN])),
                SimpleAverage::new(),
            )
        })
        .with_dependencies(LEVEL1),
    );

    builder.register(
        ModelSpec::new("l2_weighted", || {
            WeightedAverage::flat(vec![0.1, 0.25, 0.25, 0.2, 0.1, 0.1], true).with_models(LEVEL1)
        })
        .with_dependencies(LEVEL1),
    );

    builder.register(
        ModelSpec::new("l2_group_gbt", || {
            let member = factory(|| MultiLabel::boosting(level2_boosting(), true));
            Pipeline::new(
                PipelineNode::sequence(vec![
                    PipelineNode::step(DropColumns::new([TEXT_COLUMN])),
                    PipelineNode::step(GroupAverage::new(level1_groups())),
                ]),
                Bagged::new(5, member).with_seed(7),
            )
        })
        .with_dependencies(LEVEL1),
    );
}

/// Register the level-3 blend
pub fn register_level3(builder: &mut RegistryBuilder) {
    builder.register(
        ModelSpec::new("l3_blend", || {
            // Rows follow the model order, columns the six labels
            let weights = array![
                [0.01, 0.1, 0.1, 0.1, 0.1, 0.1],
                [0.99, 0.9, 0.9, 0.9, 0.9, 0.9]
            ];
            Pipeline::new(
                PipelineNode::step(DropColumns::new([TEXT_COLUMN])),
                WeightedAverage::new(Weights::PerLabel(weights), false).with_models(["l2_avg", "l2_group_gbt"]),
            )
        })
        .with_dependencies(["l2_avg", "l2_group_gbt"]),
    );
}

/// Every preset model
pub fn toxicity_registry() -> ModelRegistry {
    let mut builder = RegistryBuilder::new();
    register_level1(&mut builder);
    register_level2(&mut builder);
    register_level3(&mut builder);
    builder.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::graph;

    #[test]
    fn test_registry_is_consistent() {
        let registry = toxicity_registry();
        registry.validate().unwrap();
        assert_eq!(registry.len(), LEVEL1.len() + 4);

        let order = graph::topological_order(&registry, &["l3_blend".to_string()]).unwrap();
        assert_eq!(order.last().map(String::as_str), Some("l3_blend"));
        let waves = graph::waves(&registry, &order).unwrap();
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[0].len(), LEVEL1.len());
    }

    #[test]
    fn test_descriptions_are_stable() {
        let a = toxicity_registry();
        let b = toxicity_registry();
        for name in a.names() {
            assert_eq!(
                a.resolve(name).unwrap().description(),
                b.resolve(name).unwrap().description()
            );
        }
        assert!(a.resolve("l2_group_gbt").unwrap().description().contains("group_average"));
    }
}
