//! Dependency resolution and build orchestration
//!
//! Building a model means: build (or load) every model it depends on,
//! assemble its input frame from the base columns, its feature sets and the
//! dependencies' prediction columns, run the out-of-fold procedure and
//! commit the resulting artifacts.
//!
//! Models are scheduled in dependency waves. Models inside one wave are
//! independent and run concurrently on a bounded thread pool.

pub mod graph;
mod singleflight;

pub use crate::oof::CancellationToken;
pub use singleflight::{KeyClaim, KeyedLocks};

use crate::cache::{fingerprint, ArtifactKey, ArtifactStore, PredictionArtifact, Split};
use crate::config::StackConfig;
use crate::error::{Result, StackError};
use crate::features::FeatureProvider;
use crate::frame::FeatureFrame;
use crate::oof::OofRunner;
use crate::registry::{ModelRegistry, ModelSpec};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What `build_all` does when a model fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop at the first failure and return its error
    #[default]
    FailFast,
    /// Keep building everything that does not depend on a failed model
    BestEffort,
}

/// Outcome of one model within an invocation
#[derive(Debug, Clone, PartialEq)]
pub enum BuildStatus {
    Computed,
    /// Valid artifacts were already in the store
    Cached,
    Failed(String),
    /// Not attempted because a dependency failed
    Skipped { failed_dependency: String },
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStatus::Computed => f.write_str("computed"),
            BuildStatus::Cached => f.write_str("cached"),
            BuildStatus::Failed(reason) => write!(f, "failed: {}", reason),
            BuildStatus::Skipped { failed_dependency } => {
                write!(f, "skipped ({} failed)", failed_dependency)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelOutcome {
    pub model: String,
    pub status: BuildStatus,
    pub elapsed_secs: f64,
}

/// Per-model outcomes of one invocation, in build order
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub outcomes: Vec<ModelOutcome>,
}

impl BuildReport {
    fn names_with(&self, pred: impl Fn(&BuildStatus) -> bool) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| pred(&o.status))
            .map(|o| o.model.as_str())
            .collect()
    }

    /// Models whose out-of-fold procedure ran
    pub fn computed(&self) -> Vec<&str> {
        self.names_with(|s| matches!(s, BuildStatus::Computed))
    }

    pub fn cached(&self) -> Vec<&str> {
        self.names_with(|s| matches!(s, BuildStatus::Cached))
    }

    pub fn failed(&self) -> Vec<&str> {
        self.names_with(|s| matches!(s, BuildStatus::Failed(_)))
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.names_with(|s| matches!(s, BuildStatus::Skipped { .. }))
    }

    pub fn status(&self, model: &str) -> Option<&BuildStatus> {
        self.outcomes.iter().find(|o| o.model == model).map(|o| &o.status)
    }

    pub fn is_success(&self) -> bool {
        self.failed().is_empty() && self.skipped().is_empty()
    }
}

/// Committed artifacts of one model
#[derive(Debug, Clone)]
pub struct BuiltModel {
    pub name: String,
    pub fingerprint: String,
    pub train: Arc<PredictionArtifact>,
    pub test: Arc<PredictionArtifact>,
}

/// Result of [`BuildOrchestrator::build`]
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub model: BuiltModel,
    pub report: BuildReport,
}

/// Builds models from a frozen registry
pub struct BuildOrchestrator {
    registry: Arc<ModelRegistry>,
    provider: Arc<dyn FeatureProvider>,
    store: Arc<dyn ArtifactStore>,
    config: StackConfig,
    cancel: CancellationToken,
    locks: KeyedLocks,
    pool: rayon::ThreadPool,
}

impl fmt::Debug for BuildOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildOrchestrator")
            .field("models", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}

impl BuildOrchestrator {
    pub fn new(
        registry: Arc<ModelRegistry>,
        provider: Arc<dyn FeatureProvider>,
        store: Arc<dyn ArtifactStore>,
        config: StackConfig,
    ) -> Result<Self> {
        config.validate()?;
        let schema = config.label_schema()?;
        if provider.labels().schema() != &schema {
            return Err(StackError::InvalidParameter {
                name: "labels".to_string(),
                value: schema.names().join(","),
                reason: format!(
                    "provider labels are [{}]",
                    provider.labels().schema().names().join(",")
                ),
            });
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_parallel_builds)
            .thread_name(|i| format!("stackwise-build-{}", i))
            .build()
            .map_err(|e| StackError::InvalidParameter {
                name: "max_parallel_builds".to_string(),
                value: config.max_parallel_builds.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            registry,
            provider,
            store,
            config,
            cancel: CancellationToken::new(),
            locks: KeyedLocks::new(),
            pool,
        })
    }

    /// Share an externally owned cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Build order of `name` and everything it depends on, dependencies first
    pub fn plan(&self, name: &str) -> Result<Vec<String>> {
        graph::topological_order(&self.registry, &[name.to_string()])
    }

    /// The build order of `names` grouped into waves of independent models
    pub fn plan_waves(&self, names: &[String]) -> Result<Vec<Vec<String>>> {
        let order = graph::topological_order(&self.registry, names)?;
        graph::waves(&self.registry, &order)
    }

    /// Build `name`, reusing every valid artifact in the store
    pub fn build(&self, name: &str) -> Result<BuildOutput> {
        let order = self.plan(name)?;
        let (mut built, report) = self.execute(order, FailurePolicy::FailFast)?;
        let model = built
            .remove(name)
            .ok_or_else(|| StackError::UnknownModel(name.to_string()))?;
        Ok(BuildOutput { model, report })
    }

    /// Build several targets with one shared memo
    pub fn build_all(&self, names: &[String], policy: FailurePolicy) -> Result<BuildReport> {
        let order = match policy {
            FailurePolicy::FailFast => graph::topological_order(&self.registry, names)?,
            FailurePolicy::BestEffort => {
                // A target that cannot be planned is reported, the rest still build
                let mut order: Vec<String> = Vec::new();
                let mut unplanned = Vec::new();
                for name in names {
                    match graph::topological_order(&self.registry, std::slice::from_ref(name)) {
                        Ok(sub) => {
                            for model in sub {
                                if !order.contains(&model) {
                                    order.push(model);
                                }
                            }
                        }
                        Err(e) => {
                            error!(model = %name, error = %e, "cannot plan model");
                            unplanned.push(ModelOutcome {
                                model: name.clone(),
                                status: BuildStatus::Failed(e.to_string()),
                                elapsed_secs: 0.0,
                            });
                        }
                    }
                }
                let (_, mut report) = self.execute(order, policy)?;
                report.outcomes.extend(unplanned);
                return Ok(report);
            }
        };
        let (_, report) = self.execute(order, policy)?;
        Ok(report)
    }

    /// Remove the stored artifacts of `name` and of every model stacked on it
    pub fn invalidate(&self, name: &str) -> Result<usize> {
        self.registry.resolve(name)?;
        let mut removed = self.store.invalidate(name)?;
        for dependent in graph::dependents(&self.registry, name) {
            removed += self.store.invalidate(&dependent)?;
        }
        info!(model = %name, removed, "artifacts invalidated");
        Ok(removed)
    }

    fn execute(
        &self,
        order: Vec<String>,
        policy: FailurePolicy,
    ) -> Result<(HashMap<String, BuiltModel>, BuildReport)> {
        let waves = graph::waves(&self.registry, &order)?;
        let mut built: HashMap<String, BuiltModel> = HashMap::new();
        let mut broken: HashSet<String> = HashSet::new();
        let mut report = BuildReport::default();
        let start = Instant::now();

        for (wave_idx, wave) in waves.iter().enumerate() {
            self.cancel.check()?;

            let mut runnable = Vec::with_capacity(wave.len());
            for name in wave {
                let spec = self.registry.resolve(name)?;
                match spec.dependencies().iter().find(|d| broken.contains(*d)) {
                    Some(dep) => {
                        warn!(model = %name, dependency = %dep, "skipped, dependency failed");
                        broken.insert(name.clone());
                        report.outcomes.push(ModelOutcome {
                            model: name.clone(),
                            status: BuildStatus::Skipped {
                                failed_dependency: dep.clone(),
                            },
                            elapsed_secs: 0.0,
                        });
                    }
                    None => runnable.push(spec),
                }
            }
            debug!(wave = wave_idx, models = runnable.len(), "building wave");

            // Claimed on the calling thread: pool workers never wait on a key
            let names: Vec<String> = runnable.iter().map(|spec| spec.name().to_string()).collect();
            let _claim = self.locks.claim(&names);

            let results: Vec<(String, Result<(BuiltModel, BuildStatus)>, f64)> = self.pool.install(|| {
                runnable
                    .par_iter()
                    .map(|spec| {
                        let model_start = Instant::now();
                        let result = self.build_model(spec, &built);
                        (spec.name().to_string(), result, model_start.elapsed().as_secs_f64())
                    })
                    .collect()
            });

            for (name, result, elapsed_secs) in results {
                match result {
                    Ok((model, status)) => {
                        built.insert(name.clone(), model);
                        report.outcomes.push(ModelOutcome {
                            model: name,
                            status,
                            elapsed_secs,
                        });
                    }
                    Err(StackError::Cancelled) => return Err(StackError::Cancelled),
                    Err(e) if policy == FailurePolicy::FailFast => return Err(e),
                    Err(e) => {
                        error!(model = %name, error = %e, "model build failed");
                        broken.insert(name.clone());
                        report.outcomes.push(ModelOutcome {
                            model: name,
                            status: BuildStatus::Failed(e.to_string()),
                            elapsed_secs,
                        });
                    }
                }
            }
        }

        info!(
            models = report.outcomes.len(),
            computed = report.computed().len(),
            cached = report.cached().len(),
            failed = report.failed().len(),
            elapsed_secs = start.elapsed().as_secs_f64(),
            "build finished"
        );
        Ok((built, report))
    }

    fn build_model(&self, spec: &ModelSpec, built: &HashMap<String, BuiltModel>) -> Result<(BuiltModel, BuildStatus)> {
        let name = spec.name();
        self.cancel.check()?;
        let fp = self.fingerprint(spec, built).map_err(|e| e.in_model(name))?;

        self.load_or_compute(spec, built, &fp).map_err(|e| e.in_model(name))
    }

    /// Cached artifacts when they match `fp`, otherwise the out-of-fold run
    fn load_or_compute(
        &self,
        spec: &ModelSpec,
        built: &HashMap<String, BuiltModel>,
        fp: &str,
    ) -> Result<(BuiltModel, BuildStatus)> {
        let name = spec.name();
        let train_key = ArtifactKey::train(name);
        let test_key = ArtifactKey::test(name);
        let cached_train = self.store.get_valid(&train_key, fp)?;
        let cached_test = self.store.get_valid(&test_key, fp)?;
        if let (Some(train), Some(test)) = (cached_train, cached_test) {
            info!(model = %name, "using cached predictions");
            return Ok((
                BuiltModel {
                    name: name.to_string(),
                    fingerprint: fp.to_string(),
                    train: Arc::new(train),
                    test: Arc::new(test),
                },
                BuildStatus::Cached,
            ));
        }

        let start = Instant::now();
        info!(model = %name, estimator = %spec.description(), "building model");
        let train_frame = self.assemble(spec, Split::Train, built)?;
        let test_frame = self.assemble(spec, Split::Test, built)?;

        let runner = OofRunner::new(self.config.splitter())
            .with_parallel_folds(self.config.parallel_folds)
            .with_cancellation(self.cancel.clone());
        let out = runner.run(spec.factory(), &train_frame, self.provider.labels(), &test_frame)?;

        let mut artifacts = Vec::with_capacity(out.fold_test.len() + 2);
        for (k, fold) in out.fold_test.into_iter().enumerate() {
            artifacts.push(PredictionArtifact::new(
                test_key.clone().with_fold(k),
                out.test_ids.clone(),
                fold,
                fp.to_string(),
            )?);
        }
        let test = PredictionArtifact::new(test_key, out.test_ids, out.test, fp.to_string())?;
        let train = PredictionArtifact::new(train_key, out.train_ids, out.train, fp.to_string())?;
        artifacts.push(test.clone());
        artifacts.push(train.clone());
        self.commit(&artifacts)?;

        info!(
            model = %name,
            columns = train_frame.n_columns(),
            elapsed_secs = start.elapsed().as_secs_f64(),
            "model built"
        );
        Ok((
            BuiltModel {
                name: name.to_string(),
                fingerprint: fp.to_string(),
                train: Arc::new(train),
                test: Arc::new(test),
            },
            BuildStatus::Computed,
        ))
    }

    /// Write every artifact or, on failure, remove the ones already written
    fn commit(&self, artifacts: &[PredictionArtifact]) -> Result<()> {
        for (i, artifact) in artifacts.iter().enumerate() {
            if let Err(e) = self.store.put(artifact) {
                for written in &artifacts[..i] {
                    if let Err(cleanup) = self.store.remove(&written.key) {
                        warn!(key = %written.key, error = %cleanup, "could not remove partial artifact");
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Identity of everything that determines a model's predictions
    fn fingerprint(&self, spec: &ModelSpec, built: &HashMap<String, BuiltModel>) -> Result<String> {
        let mut parts = vec![
            spec.name().to_string(),
            spec.description().to_string(),
            spec.feature_sets().join(","),
            serde_json::to_string(&self.config.cv_strategy)?,
            self.config.n_folds.to_string(),
            self.config.seed.to_string(),
            self.config.text_column.clone(),
            self.config.labels.join(","),
            self.provider.describe(),
        ];
        for dep in spec.dependencies() {
            let upstream = built
                .get(dep)
                .ok_or_else(|| StackError::UnknownModel(dep.clone()))?;
            parts.push(format!("{}={}", dep, upstream.fingerprint));
        }
        Ok(fingerprint(parts))
    }

    /// Base columns, feature sets and dependency predictions, joined on row id
    fn assemble(&self, spec: &ModelSpec, split: Split, built: &HashMap<String, BuiltModel>) -> Result<FeatureFrame> {
        let mut frame = self.provider.base(split)?;
        if !spec.feature_sets().is_empty() {
            frame.join(&self.provider.columns(spec.feature_sets(), split)?)?;
        }
        for dep in spec.dependencies() {
            let upstream = built
                .get(dep)
                .ok_or_else(|| StackError::UnknownModel(dep.clone()))?;
            let artifact = match split {
                Split::Train => &upstream.train,
                Split::Test => &upstream.test,
            };
            frame.insert_predictions(dep, &artifact.row_ids, &artifact.predictions)?;
        }
        debug!(model = %spec.name(), split = %split, columns = frame.n_columns(), "frame assembled");
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::ensemble::SimpleAverage;
    use crate::features::StaticFeatureProvider;
    use crate::frame::{LabelMatrix, LabelSchema};
    use crate::registry::RegistryBuilder;

    fn provider() -> Arc<dyn FeatureProvider> {
        let train = FeatureFrame::with_row_count(6)
            .with_numeric("seed__toxic", vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6])
            .unwrap();
        let test = FeatureFrame::new(vec![6, 7])
            .with_numeric("seed__toxic", vec![0.7, 0.8])
            .unwrap();
        let labels = LabelMatrix::zeros(LabelSchema::new(["toxic"]).unwrap(), 6);
        Arc::new(StaticFeatureProvider::new(train, labels, test).unwrap())
    }

    fn orchestrator(registry: ModelRegistry) -> BuildOrchestrator {
        let config = StackConfig::default().with_labels(["toxic"]).with_n_folds(3);
        BuildOrchestrator::new(registry.into_shared(), provider(), Arc::new(MemoryStore::new()), config).unwrap()
    }

    #[test]
    fn test_plan_and_report() {
        let registry = RegistryBuilder::new()
            .with(ModelSpec::new("base", SimpleAverage::new))
            .with(ModelSpec::new("top", SimpleAverage::new).with_dependencies(["base"]))
            .freeze();
        let orch = orchestrator(registry);
        assert_eq!(orch.plan("top").unwrap(), vec!["base", "top"]);

        let out = orch.build("top").unwrap();
        assert_eq!(out.report.computed(), vec!["base", "top"]);
        // Averages of a single block are the block itself
        assert_eq!(out.model.train.predictions.column(0).to_vec(), vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);

        let again = orch.build("top").unwrap();
        assert_eq!(again.report.cached(), vec!["base", "top"]);
    }

    #[test]
    fn test_best_effort_skips_dependents() {
        let registry = RegistryBuilder::new()
            .with(ModelSpec::new("ok", SimpleAverage::new))
            .with(ModelSpec::new("bad", SimpleAverage::new).with_features(["missing"]))
            .with(ModelSpec::new("top", SimpleAverage::new).with_dependencies(["bad"]))
            .freeze();
        let orch = orchestrator(registry);
        let report = orch
            .build_all(&["ok".to_string(), "top".to_string()], FailurePolicy::BestEffort)
            .unwrap();
        assert_eq!(report.computed(), vec!["ok"]);
        assert_eq!(report.failed(), vec!["bad"]);
        assert_eq!(report.skipped(), vec!["top"]);

        let err = orch
            .build_all(&["top".to_string()], FailurePolicy::FailFast)
            .unwrap_err();
        assert_eq!(err.failed_model(), Some("bad"));
        assert!(matches!(err.root(), StackError::FeatureNotFound(_)));
    }

    #[test]
    fn test_cancelled_build_commits_nothing() {
        let registry = RegistryBuilder::new()
            .with(ModelSpec::new("base", SimpleAverage::new))
            .freeze();
        let orch = orchestrator(registry);
        orch.cancellation_token().cancel();
        assert!(matches!(orch.build("base"), Err(StackError::Cancelled)));
    }
}
