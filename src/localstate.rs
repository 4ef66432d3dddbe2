//! Local State Cache
//!
//! Mirrors the last known `WorkItem` for each in-flight migration as a
//! `<uuid>.json` file, so a crashed worker can resume where it left off.
//! The file exists from claim time until the item reaches `Completed`;
//! failed items keep their snapshot for inspection and forced re-claim.
//!
//! The cache is a convenience for crash recovery, not a correctness
//! requirement: the remote store stays authoritative. One process per UUID
//! at a time is an operational precondition, so no file locking is done.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::store::WorkItem;

#[derive(Debug, Error)]
pub enum LocalStateError {
    #[error("no local state for work item {uuid}")]
    NotFound { uuid: Uuid },

    #[error("failed to {action} local state file {path}: {source}")]
    Io {
        action: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("local state file {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// File-backed cache of work-item snapshots, one file per UUID.
pub struct LocalStateCache {
    dir: PathBuf,
}

impl LocalStateCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, uuid: Uuid) -> PathBuf {
        self.dir.join(format!("{uuid}.json"))
    }

    /// Serializes the full work item to `<uuid>.json`, overwriting any
    /// previous snapshot.
    pub fn save(&self, item: &WorkItem) -> Result<(), LocalStateError> {
        let path = self.path(item.uuid);
        let data = serde_json::to_vec(item).expect("work item serialization");
        fs::write(&path, data).map_err(|source| LocalStateError::Io {
            action: "write",
            path: path.display().to_string(),
            source,
        })?;
        tracing::debug!(uuid = %item.uuid, path = %path.display(), "local state saved");
        Ok(())
    }

    /// Loads the snapshot for the given UUID.
    pub fn load(&self, uuid: Uuid) -> Result<WorkItem, LocalStateError> {
        let path = self.path(uuid);
        let data = fs::read(&path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                LocalStateError::NotFound { uuid }
            } else {
                LocalStateError::Io {
                    action: "read",
                    path: path.display().to_string(),
                    source,
                }
            }
        })?;
        serde_json::from_slice(&data).map_err(|source| LocalStateError::Corrupt {
            path: path.display().to_string(),
            source,
        })
    }

    /// Removes the snapshot. Deleting an absent snapshot is not an error.
    pub fn delete(&self, uuid: Uuid) -> Result<(), LocalStateError> {
        let path = self.path(uuid);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(uuid = %uuid, "local state deleted");
                Ok(())
            }
            Err(source) if source.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LocalStateError::Io {
                action: "delete",
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// True if a snapshot exists for the given UUID.
    pub fn exists(&self, uuid: Uuid) -> bool {
        self.path(uuid).exists()
    }
}
