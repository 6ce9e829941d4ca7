//! Prediction artifact store
//!
//! Out-of-fold and test predictions are persisted per
//! `(model, split, fold)` key together with a fingerprint of everything that
//! produced them. A stored artifact is reused only while its fingerprint
//! still matches.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::{Result, StackError};
use crate::frame::LabelMatrix;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::{debug, warn};

/// Which rows an artifact predicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    /// Out-of-fold predictions for the training rows
    Train,
    /// Predictions for the held-out test rows
    Test,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Train => f.write_str("train"),
            Split::Test => f.write_str("test"),
        }
    }
}

/// Store key. `fold` is set for the per-fold test predictions that the
/// averaged test artifact (`fold = None`) is computed from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub model: String,
    pub split: Split,
    pub fold: Option<usize>,
}

impl ArtifactKey {
    pub fn new<S: Into<String>>(model: S, split: Split) -> Self {
        Self {
            model: model.into(),
            split,
            fold: None,
        }
    }

    pub fn train<S: Into<String>>(model: S) -> Self {
        Self::new(model, Split::Train)
    }

    pub fn test<S: Into<String>>(model: S) -> Self {
        Self::new(model, Split::Test)
    }

    pub fn with_fold(mut self, fold: usize) -> Self {
        self.fold = Some(fold);
        self
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fold {
            Some(k) => write!(f, "{}/{}/fold{}", self.model, self.split, k),
            None => write!(f, "{}/{}", self.model, self.split),
        }
    }
}

/// Immutable predictions of one model on one split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionArtifact {
    pub key: ArtifactKey,
    /// Example id of each prediction row
    pub row_ids: Vec<usize>,
    pub predictions: LabelMatrix,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

impl PredictionArtifact {
    pub fn new(key: ArtifactKey, row_ids: Vec<usize>, predictions: LabelMatrix, fingerprint: String) -> Result<Self> {
        if row_ids.len() != predictions.n_rows() {
            return Err(StackError::DimensionMismatch {
                expected: row_ids.len(),
                actual: predictions.n_rows(),
            });
        }
        Ok(Self {
            key,
            row_ids,
            predictions,
            fingerprint,
            created_at: Utc::now(),
        })
    }

    pub fn label_names(&self) -> &[String] {
        self.predictions.schema().names()
    }
}

/// Persistent key-value store of prediction artifacts.
///
/// Writes are atomic per key and idempotent: writing a key again replaces the
/// previous artifact in one step.
pub trait ArtifactStore: Send + Sync {
    fn contains(&self, key: &ArtifactKey) -> Result<bool>;

    fn get(&self, key: &ArtifactKey) -> Result<Option<PredictionArtifact>>;

    fn put(&self, artifact: &PredictionArtifact) -> Result<()>;

    /// Returns whether something was removed
    fn remove(&self, key: &ArtifactKey) -> Result<bool>;

    fn keys(&self) -> Result<Vec<ArtifactKey>>;

    /// The stored artifact, if its fingerprint equals `fingerprint`.
    /// A stale artifact is removed.
    fn get_valid(&self, key: &ArtifactKey, fingerprint: &str) -> Result<Option<PredictionArtifact>> {
        match self.get(key)? {
            Some(artifact) if artifact.fingerprint == fingerprint => {
                debug!(key = %key, "artifact cache hit");
                Ok(Some(artifact))
            }
            Some(artifact) => {
                warn!(
                    key = %key,
                    stored = %short(&artifact.fingerprint),
                    expected = %short(fingerprint),
                    "stale artifact invalidated"
                );
                self.remove(key)?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Remove every artifact of `model`; returns how many were removed
    fn invalidate(&self, model: &str) -> Result<usize> {
        let mut removed = 0;
        for key in self.keys()?.into_iter().filter(|k| k.model == model) {
            if self.remove(&key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn short(fingerprint: &str) -> &str {
    &fingerprint[..fingerprint.len().min(12)]
}

/// SHA-256 over the given parts, hex encoded. Parts are length-prefixed so
/// `["ab", "c"]` and `["a", "bc"]` differ.
pub fn fingerprint<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        let bytes = part.as_ref().as_bytes();
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }
    format!("{:x}", hasher.finalize())
}
