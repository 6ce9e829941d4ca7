//! Model registry
//!
//! Named [`ModelSpec`] records: how to build a model's estimator, which
//! feature sets it reads and which other models' predictions it stacks on.
//! Populate a [`RegistryBuilder`], then `freeze` it into an immutable
//! [`ModelRegistry`] shared by everything that builds models.

use crate::error::{Result, StackError};
use crate::estimator::{Estimator, EstimatorFactory};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Declarative description of one model
#[derive(Clone)]
pub struct ModelSpec {
    name: String,
    factory: EstimatorFactory,
    feature_sets: Vec<String>,
    dependencies: Vec<String>,
    description: String,
}

impl fmt::Debug for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSpec")
            .field("name", &self.name)
            .field("feature_sets", &self.feature_sets)
            .field("dependencies", &self.dependencies)
            .field("description", &self.description)
            .finish()
    }
}

impl ModelSpec {
    /// Spec with no feature sets and no dependencies
    pub fn new<S, F, E>(name: S, factory: F) -> Self
    where
        S: Into<String>,
        F: Fn() -> E + Send + Sync + 'static,
        E: Estimator + 'static,
    {
        Self::from_factory(name, crate::estimator::factory(factory))
    }

    pub fn from_factory<S: Into<String>>(name: S, factory: EstimatorFactory) -> Self {
        let description = factory().describe();
        Self {
            name: name.into(),
            factory,
            feature_sets: Vec::new(),
            dependencies: Vec::new(),
            description,
        }
    }

    /// Extra feature-set tags joined into the model's input frame
    pub fn with_features<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.feature_sets.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Models whose out-of-fold predictions become input columns
    pub fn with_dependencies<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(models.into_iter().map(Into::into));
        self
    }

    /// Override the description derived from the estimator
    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn feature_sets(&self) -> &[String] {
        &self.feature_sets
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// A fresh, unfitted estimator
    pub fn instantiate(&self) -> Box<dyn Estimator> {
        (self.factory)()
    }

    pub fn factory(&self) -> &EstimatorFactory {
        &self.factory
    }
}

/// Mutable registry under construction
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    order: Vec<String>,
    specs: HashMap<String, ModelSpec>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a spec. A spec already registered under the same name is
    /// replaced and returned.
    pub fn register(&mut self, spec: ModelSpec) -> Option<ModelSpec> {
        let name = spec.name.clone();
        let previous = self.specs.insert(name.clone(), spec);
        if previous.is_some() {
            warn!(model = %name, "model re-registered, previous spec replaced");
        } else {
            self.order.push(name);
        }
        previous
    }

    /// Register a spec (builder style)
    pub fn with(mut self, spec: ModelSpec) -> Self {
        self.register(spec);
        self
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn freeze(self) -> ModelRegistry {
        ModelRegistry {
            order: self.order,
            specs: self.specs,
        }
    }
}

/// Immutable, queryable registry
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    order: Vec<String>,
    specs: HashMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn resolve(&self, name: &str) -> Result<&ModelSpec> {
        self.specs
            .get(name)
            .ok_or_else(|| StackError::UnknownModel(name.to_string()))
    }

    /// Direct dependencies only
    pub fn list_dependencies(&self, name: &str) -> Result<&[String]> {
        Ok(self.resolve(name)?.dependencies())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    /// Model names in registration order
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn specs(&self) -> impl Iterator<Item = &ModelSpec> {
        self.order.iter().filter_map(|n| self.specs.get(n))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Every dependency must name a registered model. Cycles are reported
    /// when a model is built, not here.
    pub fn validate(&self) -> Result<()> {
        for spec in self.specs() {
            if let Some(missing) = spec.dependencies.iter().find(|d| !self.contains(d)) {
                return Err(StackError::UnknownModel(missing.clone()).in_model(&spec.name));
            }
        }
        Ok(())
    }

    pub fn into_shared(self) -> Arc<ModelRegistry> {
        Arc::new(self)
    }
}
