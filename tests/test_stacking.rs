//! Integration test: dependency resolution and out-of-fold stacking

use parking_lot::Mutex;
use stackwise::cache::{ArtifactKey, ArtifactStore, MemoryStore};
use stackwise::config::StackConfig;
use stackwise::ensemble::SimpleAverage;
use stackwise::estimator::{Estimator, EstimatorKind};
use stackwise::features::{FeatureProvider, StaticFeatureProvider};
use stackwise::frame::{FeatureFrame, LabelMatrix, LabelSchema};
use stackwise::registry::{ModelRegistry, ModelSpec, RegistryBuilder};
use stackwise::resolver::{BuildOrchestrator, BuildStatus, FailurePolicy};
use stackwise::{Result, StackError};
use ndarray::Array2;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const N_TRAIN: usize = 9;
const N_TEST: usize = 3;

/// Predicts `id / 100` for every row and records what it was fitted on
struct Spy {
    fit_delay: Duration,
    fits: Arc<AtomicUsize>,
    leaks: Arc<AtomicUsize>,
    predicted: Arc<Mutex<Vec<usize>>>,
    fitted_ids: Vec<usize>,
    schema: Option<LabelSchema>,
}

#[derive(Clone, Default)]
struct SpyCounters {
    fit_delay: Duration,
    fits: Arc<AtomicUsize>,
    leaks: Arc<AtomicUsize>,
    predicted: Arc<Mutex<Vec<usize>>>,
}

impl SpyCounters {
    fn spec(&self, name: &str) -> ModelSpec {
        let counters = self.clone();
        ModelSpec::new(name, move || Spy {
            fit_delay: counters.fit_delay,
            fits: counters.fits.clone(),
            leaks: counters.leaks.clone(),
            predicted: counters.predicted.clone(),
            fitted_ids: Vec::new(),
            schema: None,
        })
    }

    fn fits(&self) -> usize {
        self.fits.load(Ordering::SeqCst)
    }
}

impl Estimator for Spy {
    fn fit(&mut self, frame: &FeatureFrame, labels: &LabelMatrix) -> Result<()> {
        self.fits.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.fit_delay);
        self.fitted_ids = frame.row_ids().to_vec();
        self.schema = Some(labels.schema().clone());
        Ok(())
    }

    fn predict(&self, frame: &FeatureFrame) -> Result<LabelMatrix> {
        let schema = self.schema.clone().ok_or(StackError::NotFitted)?;
        let ids = frame.row_ids();
        let leaked = ids.iter().filter(|id| self.fitted_ids.contains(id)).count();
        self.leaks.fetch_add(leaked, Ordering::SeqCst);
        self.predicted.lock().extend_from_slice(ids);

        let values = Array2::from_shape_fn((ids.len(), schema.len()), |(i, _)| ids[i] as f64 / 100.0);
        LabelMatrix::new(schema, values)
    }

    fn kind(&self) -> EstimatorKind {
        EstimatorKind::Linear
    }

    fn describe(&self) -> String {
        "spy".to_string()
    }
}

fn provider() -> Arc<dyn FeatureProvider> {
    let texts = |n: usize, offset: usize| (0..n).map(|i| format!("comment {}", i + offset)).collect();
    let train = FeatureFrame::with_row_count(N_TRAIN)
        .with_text("comment_text", texts(N_TRAIN, 0))
        .unwrap();
    let test = FeatureFrame::new((N_TRAIN..N_TRAIN + N_TEST).collect())
        .with_text("comment_text", texts(N_TEST, N_TRAIN))
        .unwrap();
    let mut labels = LabelMatrix::zeros(LabelSchema::new(["toxic", "insult"]).unwrap(), N_TRAIN);
    for i in (0..N_TRAIN).step_by(2) {
        labels.values_mut()[[i, 0]] = 1.0;
    }
    Arc::new(StaticFeatureProvider::new(train, labels, test).unwrap())
}

fn config() -> StackConfig {
    StackConfig::default()
        .with_labels(["toxic", "insult"])
        .with_n_folds(3)
        .with_max_parallel_builds(2)
}

fn orchestrator(registry: ModelRegistry, store: Arc<dyn ArtifactStore>) -> BuildOrchestrator {
    BuildOrchestrator::new(registry.into_shared(), provider(), store, config()).unwrap()
}

fn diamond(spy: &SpyCounters) -> ModelRegistry {
    RegistryBuilder::new()
        .with(spy.spec("base"))
        .with(ModelSpec::new("left", SimpleAverage::new).with_dependencies(["base"]))
        .with(ModelSpec::new("right", SimpleAverage::new).with_dependencies(["base"]))
        .with(ModelSpec::new("top", SimpleAverage::new).with_dependencies(["left", "right"]))
        .freeze()
}

fn names(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_cycle_is_reported_before_any_fit() {
    let spy = SpyCounters::default();
    let registry = RegistryBuilder::new()
        .with(spy.spec("a").with_dependencies(["b"]))
        .with(ModelSpec::new("b", SimpleAverage::new).with_dependencies(["a"]))
        .freeze();
    let orch = orchestrator(registry, Arc::new(MemoryStore::new()));

    match orch.build("a") {
        Err(StackError::CyclicDependency { cycle }) => assert_eq!(cycle, vec!["a", "b", "a"]),
        other => panic!("expected a cycle, got {:?}", other.map(|o| o.model.name)),
    }
    assert_eq!(spy.fits(), 0);
}

#[test]
fn test_unknown_dependency_is_rejected() {
    let registry = RegistryBuilder::new()
        .with(ModelSpec::new("stack", SimpleAverage::new).with_dependencies(["ghost"]))
        .freeze();
    assert!(registry.validate().is_err());

    let orch = orchestrator(registry, Arc::new(MemoryStore::new()));
    let err = orch.build("stack").unwrap_err();
    assert!(matches!(err.root(), StackError::UnknownModel(name) if name == "ghost"));
}

#[test]
fn test_shared_dependency_is_built_once() {
    let spy = SpyCounters::default();
    let orch = orchestrator(diamond(&spy), Arc::new(MemoryStore::new()));

    let report = orch
        .build_all(&names(&["left", "right", "top"]), FailurePolicy::FailFast)
        .unwrap();
    assert_eq!(report.computed().len(), 4);
    // One estimator per fold, and no more
    assert_eq!(spy.fits(), 3);

    let again = orch.build("top").unwrap();
    assert_eq!(again.report.cached(), vec!["base", "left", "right", "top"]);
    assert_eq!(spy.fits(), 3);
}

#[test]
fn test_repeated_targets_build_once() {
    let spy = SpyCounters::default();
    let registry = RegistryBuilder::new()
        .with(spy.spec("base1"))
        .with(ModelSpec::new("stack1", SimpleAverage::new).with_dependencies(["base1", "base1"]))
        .freeze();
    let orch = orchestrator(registry, Arc::new(MemoryStore::new()));

    let report = orch
        .build_all(&names(&["stack1", "base1", "stack1"]), FailurePolicy::FailFast)
        .unwrap();
    assert_eq!(report.computed(), vec!["base1", "stack1"]);
    assert_eq!(spy.fits(), 3);
}

#[test]
fn test_concurrent_builds_of_one_model_fit_once() {
    let spy = SpyCounters {
        fit_delay: Duration::from_millis(30),
        ..SpyCounters::default()
    };
    let registry = RegistryBuilder::new().with(spy.spec("m")).freeze();
    let config = config().with_n_folds(8).with_parallel_folds(true);
    let orch = Arc::new(
        BuildOrchestrator::new(registry.into_shared(), provider(), Arc::new(MemoryStore::new()), config).unwrap(),
    );

    let (tx, rx) = mpsc::channel();
    for _ in 0..4 {
        let orch = Arc::clone(&orch);
        let tx = tx.clone();
        thread::spawn(move || {
            let status = orch.build("m").map(|out| out.report.status("m").cloned());
            let _ = tx.send(status.map_err(|e| e.to_string()));
        });
    }
    drop(tx);

    let mut statuses = Vec::new();
    for _ in 0..4 {
        let status = rx
            .recv_timeout(Duration::from_secs(60))
            .expect("every concurrent build returns");
        statuses.push(status.unwrap());
    }
    let computed = statuses.iter().filter(|s| **s == Some(BuildStatus::Computed)).count();
    let cached = statuses.iter().filter(|s| **s == Some(BuildStatus::Cached)).count();
    assert_eq!((computed, cached), (1, 3));
    assert_eq!(spy.fits(), 8);
}

#[test]
fn test_invalidation_cascades_to_dependents() {
    let spy = SpyCounters::default();
    let store = Arc::new(MemoryStore::new());
    let orch = orchestrator(diamond(&spy), store.clone());
    orch.build("top").unwrap();

    let removed = orch.invalidate("left").unwrap();
    assert!(removed >= 4);
    assert!(store.contains(&ArtifactKey::train("base")).unwrap());
    assert!(!store.contains(&ArtifactKey::train("top")).unwrap());

    let report = orch.build("top").unwrap().report;
    assert_eq!(report.status("base"), Some(&BuildStatus::Cached));
    assert_eq!(report.status("right"), Some(&BuildStatus::Cached));
    assert_eq!(report.status("left"), Some(&BuildStatus::Computed));
    assert_eq!(report.status("top"), Some(&BuildStatus::Computed));
    assert_eq!(spy.fits(), 3);
}

#[test]
fn test_config_change_invalidates_fingerprint() {
    let spy = SpyCounters::default();
    let store: Arc<dyn ArtifactStore> = Arc::new(MemoryStore::new());
    orchestrator(diamond(&spy), store.clone()).build("base").unwrap();
    assert_eq!(spy.fits(), 3);

    let reseeded = BuildOrchestrator::new(
        diamond(&spy).into_shared(),
        provider(),
        store.clone(),
        config().with_seed(7),
    )
    .unwrap();
    let report = reseeded.build("base").unwrap().report;
    assert_eq!(report.computed(), vec!["base"]);
    assert_eq!(spy.fits(), 6);
}

#[test]
fn test_out_of_fold_predictions_never_see_their_own_rows() {
    let spy = SpyCounters::default();
    let orch = orchestrator(diamond(&spy), Arc::new(MemoryStore::new()));
    let built = orch.build("base").unwrap().model;

    assert_eq!(spy.leaks.load(Ordering::SeqCst), 0);

    // Every train row is predicted exactly once, every test row once per fold
    let mut predicted = spy.predicted.lock().clone();
    predicted.sort_unstable();
    let mut expected: Vec<usize> = (0..N_TRAIN).collect();
    for _ in 0..3 {
        expected.extend(N_TRAIN..N_TRAIN + N_TEST);
    }
    expected.sort_unstable();
    assert_eq!(predicted, expected);

    assert_eq!(built.train.row_ids, (0..N_TRAIN).collect::<Vec<_>>());
    assert_eq!(built.test.row_ids, (N_TRAIN..N_TRAIN + N_TEST).collect::<Vec<_>>());
}

#[test]
fn test_predictions_follow_input_row_order() {
    let spy = SpyCounters::default();
    let orch = orchestrator(diamond(&spy), Arc::new(MemoryStore::new()));
    let built = orch.build("top").unwrap().model;

    // Averages of identical upstream blocks reproduce the spy's `id / 100`
    for (i, &id) in built.train.row_ids.iter().enumerate() {
        for j in 0..2 {
            let value = built.train.predictions.values()[[i, j]];
            assert!((value - id as f64 / 100.0).abs() < 1e-12, "row {} label {}", i, j);
        }
    }
    for (i, &id) in built.test.row_ids.iter().enumerate() {
        let value = built.test.predictions.values()[[i, 0]];
        assert!((value - id as f64 / 100.0).abs() < 1e-12);
    }
    assert_eq!(built.train.label_names(), &["toxic".to_string(), "insult".to_string()]);
}

#[test]
fn test_fold_test_artifacts_are_stored() {
    let spy = SpyCounters::default();
    let store = Arc::new(MemoryStore::new());
    let orch = orchestrator(diamond(&spy), store.clone());
    orch.build("base").unwrap();

    for k in 0..3 {
        assert!(store.contains(&ArtifactKey::test("base").with_fold(k)).unwrap());
    }
    assert!(!store.contains(&ArtifactKey::test("base").with_fold(3)).unwrap());
}

#[test]
fn test_too_few_folds_is_insufficient_data() {
    let spy = SpyCounters::default();
    let registry = RegistryBuilder::new().with(spy.spec("base")).freeze();
    let orch = BuildOrchestrator::new(
        registry.into_shared(),
        provider(),
        Arc::new(MemoryStore::new()),
        config().with_n_folds(1),
    )
    .unwrap();

    let err = orch.build("base").unwrap_err();
    assert_eq!(err.failed_model(), Some("base"));
    assert!(matches!(err.root(), StackError::InsufficientData(_)));
    assert_eq!(spy.fits(), 0);
}

#[test]
fn test_more_folds_than_rows_is_insufficient_data() {
    let spy = SpyCounters::default();
    let registry = RegistryBuilder::new().with(spy.spec("base")).freeze();
    let orch = BuildOrchestrator::new(
        registry.into_shared(),
        provider(),
        Arc::new(MemoryStore::new()),
        config().with_n_folds(N_TRAIN + 1),
    )
    .unwrap();

    assert!(matches!(
        orch.build("base").unwrap_err().root(),
        StackError::InsufficientData(_)
    ));
}

#[test]
fn test_mismatched_labels_are_rejected() {
    let registry = RegistryBuilder::new()
        .with(ModelSpec::new("avg", SimpleAverage::new))
        .freeze();
    let result = BuildOrchestrator::new(
        registry.into_shared(),
        provider(),
        Arc::new(MemoryStore::new()),
        StackConfig::default(),
    );
    assert!(matches!(result, Err(StackError::InvalidParameter { .. })));
}
