//! Durable state file for the ledger.
//!
//! The file is a JSON array of task records with the peer map flattened into
//! ordered `[peer_id, counter]` pairs. Saving always rewrites the file
//! wholesale from a snapshot; there is no append or merge path.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::StateError;
use crate::ledger::{LedgerSnapshot, PeerCounter, TaskRecord};
use crate::types::PeerId;

// ----------------------------------------------------------------------------
// Persisted Record Shape
// ----------------------------------------------------------------------------

/// On-disk shape of one task record.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedTask {
    task_id: crate::types::TaskId,
    uploaded_bytes: u64,
    downloaded_bytes: u64,
    peers: Vec<(PeerId, PeerCounter)>,
}

impl From<&TaskRecord> for PersistedTask {
    fn from(record: &TaskRecord) -> Self {
        Self {
            task_id: record.task_id.clone(),
            uploaded_bytes: record.uploaded_bytes,
            downloaded_bytes: record.downloaded_bytes,
            peers: record
                .peers
                .iter()
                .map(|(peer, counter)| (peer.clone(), *counter))
                .collect(),
        }
    }
}

impl From<PersistedTask> for TaskRecord {
    fn from(persisted: PersistedTask) -> Self {
        Self {
            task_id: persisted.task_id,
            uploaded_bytes: persisted.uploaded_bytes,
            downloaded_bytes: persisted.downloaded_bytes,
            peers: persisted.peers.into_iter().collect(),
        }
    }
}

// ----------------------------------------------------------------------------
// State Store
// ----------------------------------------------------------------------------

/// Reads and writes the ledger state file.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all persisted task records.
    ///
    /// A missing file means a first run and yields no records. A file that
    /// exists but does not decode is `StateError::Corrupt`, which callers
    /// treat as fatal at startup.
    pub async fn load(&self) -> Result<Vec<TaskRecord>, StateError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no previous state file, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(StateError::Io {
                    path: self.path.display().to_string(),
                    source: e,
                })
            }
        };

        let persisted: Vec<PersistedTask> =
            serde_json::from_slice(&bytes).map_err(|e| StateError::Corrupt {
                path: self.path.display().to_string(),
                source: e,
            })?;

        Ok(persisted.into_iter().map(TaskRecord::from).collect())
    }

    /// Overwrite the state file with a full serialization of the snapshot.
    pub async fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StateError::Io {
                    path: parent.display().to_string(),
                    source: e,
                })?;
        }

        let persisted: Vec<PersistedTask> = snapshot.tasks.iter().map(PersistedTask::from).collect();
        let json = serde_json::to_vec_pretty(&persisted).map_err(|e| StateError::Corrupt {
            path: self.path.display().to_string(),
            source: e,
        })?;

        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| StateError::Io {
                path: self.path.display().to_string(),
                source: e,
            })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
