//! Resource version checkpoint.
//!
//! Persists the last processed resource version of one watch to
//! `<dir>/<cache-id>.json`, so a restarted process resumes where the previous
//! one stopped instead of relisting.

use crate::error::ControllerError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// On-disk checkpoint record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointRecord {
    /// Cache ID of the watch the record belongs to
    pub cache_id: String,
    /// Watched resource, for humans reading the file
    #[serde(default)]
    pub resource: String,
    /// Last processed resource version, `None` after a stale-cursor purge
    #[serde(default)]
    pub resource_version: Option<String>,
}

/// Checkpoint file of one watch
#[derive(Debug, Clone)]
pub struct Checkpoint {
    path: PathBuf,
    cache_id: String,
    resource: String,
}

impl Checkpoint {
    /// Checkpoint for `cache_id` stored under `dir`
    pub fn new(dir: &Path, cache_id: &str, resource: impl Into<String>) -> Self {
        Self {
            path: dir.join(format!("{}.json", cache_id)),
            cache_id: cache_id.to_string(),
            resource: resource.into(),
        }
    }

    /// File the checkpoint is stored in
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored resource version.
    ///
    /// A missing file, or one written for another watch, yields `None`.
    pub async fn load(&self) -> Result<Option<String>, ControllerError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No checkpoint at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let record: CheckpointRecord = serde_json::from_slice(&bytes)?;
        if record.cache_id != self.cache_id {
            warn!(
                "Ignoring checkpoint {} written for watch {}",
                self.path.display(),
                record.cache_id
            );
            return Ok(None);
        }
        Ok(record.resource_version)
    }

    /// Store a resource version, replacing the file atomically
    pub async fn save(&self, resource_version: Option<&str>) -> Result<(), ControllerError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let record = CheckpointRecord {
            cache_id: self.cache_id.clone(),
            resource: self.resource.clone(),
            resource_version: resource_version.map(str::to_string),
        };
        let json = serde_json::to_vec_pretty(&record)?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Checkpointed {:?} to {}", resource_version, self.path.display());
        Ok(())
    }
}
