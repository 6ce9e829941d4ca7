//! File-backed artifact store

use super::{ArtifactKey, ArtifactStore, PredictionArtifact, Split};
use crate::error::{Result, StackError};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// One JSON file per artifact under `root/{model}/`.
///
/// Files are written to a uniquely named temporary file in the same directory
/// and renamed into place, so readers never observe a partial artifact.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn model_dir(&self, model: &str) -> Result<PathBuf> {
        if model.is_empty() || model.starts_with('.') || model.contains(['/', '\\']) {
            return Err(StackError::InvalidParameter {
                name: "model".to_string(),
                value: model.to_string(),
                reason: "not usable as a directory name".to_string(),
            });
        }
        Ok(self.root.join(model))
    }

    fn file_name(key: &ArtifactKey) -> String {
        match key.fold {
            Some(k) => format!("{}.fold{}.json", key.split, k),
            None => format!("{}.json", key.split),
        }
    }

    fn parse_file_name(model: &str, name: &str) -> Option<ArtifactKey> {
        let stem = name.strip_suffix(".json")?;
        let (split, fold) = match stem.split_once(".fold") {
            Some((split, fold)) => (split, Some(fold.parse().ok()?)),
            None => (stem, None),
        };
        let split = match split {
            "train" => Split::Train,
            "test" => Split::Test,
            _ => return None,
        };
        Some(ArtifactKey {
            model: model.to_string(),
            split,
            fold,
        })
    }

    pub fn path_for(&self, key: &ArtifactKey) -> Result<PathBuf> {
        Ok(self.model_dir(&key.model)?.join(Self::file_name(key)))
    }
}

impl ArtifactStore for FileStore {
    fn contains(&self, key: &ArtifactKey) -> Result<bool> {
        Ok(self.path_for(key)?.is_file())
    }

    fn get(&self, key: &ArtifactKey) -> Result<Option<PredictionArtifact>> {
        let path = self.path_for(key)?;
        if !path.is_file() {
            return Ok(None);
        }
        let reader = BufReader::new(File::open(&path)?);
        let artifact: PredictionArtifact = serde_json::from_reader(reader)?;
        Ok(Some(artifact))
    }

    fn put(&self, artifact: &PredictionArtifact) -> Result<()> {
        let dir = self.model_dir(&artifact.key.model)?;
        fs::create_dir_all(&dir)?;
        let target = dir.join(Self::file_name(&artifact.key));
        let tmp = dir.join(format!(".{}.{}.tmp", Self::file_name(&artifact.key), Uuid::new_v4()));

        let written = (|| -> Result<()> {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, artifact)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            Ok(())
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, &target)?;
        debug!(key = %artifact.key, path = %target.display(), "artifact written");
        Ok(())
    }

    fn remove(&self, key: &ArtifactKey) -> Result<bool> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<ArtifactKey>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let model = entry.file_name().to_string_lossy().into_owned();
            for file in fs::read_dir(entry.path())? {
                let name = file?.file_name().to_string_lossy().into_owned();
                if let Some(key) = Self::parse_file_name(&model, &name) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}
