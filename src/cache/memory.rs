//! In-process artifact store

use super::{ArtifactKey, ArtifactStore, PredictionArtifact};
use crate::error::Result;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Artifact store backed by a map; artifacts live as long as the store
#[derive(Debug, Default)]
pub struct MemoryStore {
    artifacts: RwLock<HashMap<ArtifactKey, PredictionArtifact>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.artifacts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.read().is_empty()
    }
}

impl ArtifactStore for MemoryStore {
    fn contains(&self, key: &ArtifactKey) -> Result<bool> {
        Ok(self.artifacts.read().contains_key(key))
    }

    fn get(&self, key: &ArtifactKey) -> Result<Option<PredictionArtifact>> {
        Ok(self.artifacts.read().get(key).cloned())
    }

    fn put(&self, artifact: &PredictionArtifact) -> Result<()> {
        self.artifacts
            .write()
            .insert(artifact.key.clone(), artifact.clone());
        Ok(())
    }

    fn remove(&self, key: &ArtifactKey) -> Result<bool> {
        Ok(self.artifacts.write().remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<ArtifactKey>> {
        let mut keys: Vec<ArtifactKey> = self.artifacts.read().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
