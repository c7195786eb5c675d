//! The ledger: authoritative per-task, per-peer transfer accounting.
//!
//! The ledger is the one piece of state mutated from several event sources
//! at once (transfer-engine byte events, discovery registrations, explicit
//! removals). Every mutation happens as a single atomic step under one lock,
//! so a reader never observes a task record whose totals disagree with the
//! sum of its peer counters.
//!
//! Iteration order everywhere is the `BTreeMap` key order. That keeps
//! snapshots, reports, and the persisted file deterministic for a given set
//! of records.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::engine::TransferEngine;
use crate::errors::{CourierResult, StateError};
use crate::state::StateStore;
use crate::types::{Direction, PeerId, TaskId};

// ----------------------------------------------------------------------------
// Records
// ----------------------------------------------------------------------------

/// Upload/download byte counters for one (task, peer) pair.
///
/// Monotonically non-decreasing for the lifetime of the pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerCounter {
    pub uploaded_bytes: u64,
    pub downloaded_bytes: u64,
}

/// Accounting record for one distribution task.
///
/// Invariant: `uploaded_bytes` equals the sum of the peer uploaded counters,
/// and symmetrically for downloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub uploaded_bytes: u64,
    pub downloaded_bytes: u64,
    pub peers: BTreeMap<PeerId, PeerCounter>,
}

impl TaskRecord {
    fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            uploaded_bytes: 0,
            downloaded_bytes: 0,
            peers: BTreeMap::new(),
        }
    }
}

/// Point-in-time consistent copy of every task record.
///
/// Taken under the ledger lock, so no partially applied update is visible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub tasks: Vec<TaskRecord>,
}

impl LedgerSnapshot {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }
}

// ----------------------------------------------------------------------------
// Ledger
// ----------------------------------------------------------------------------

/// Durable accounting store keyed by task identifier.
///
/// Owned by the runtime and shared with the worker loops behind an `Arc`;
/// external callers mutate it only through the operations below.
pub struct Ledger {
    tasks: Mutex<BTreeMap<TaskId, TaskRecord>>,
    engine: Arc<dyn TransferEngine>,
    store: StateStore,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new(engine: Arc<dyn TransferEngine>, store: StateStore) -> Self {
        Self {
            tasks: Mutex::new(BTreeMap::new()),
            engine,
            store,
        }
    }

    /// Load the ledger from the durable state file.
    ///
    /// A missing file is a normal first run and yields an empty ledger. A
    /// malformed file is a fatal startup error: discarding it silently would
    /// lose accounting history without operator awareness.
    pub async fn load(engine: Arc<dyn TransferEngine>, store: StateStore) -> CourierResult<Self> {
        let records = store.load().await?;
        let mut tasks = BTreeMap::new();
        for record in records {
            tasks.insert(record.task_id.clone(), record);
        }
        info!(tasks = tasks.len(), "ledger state loaded");
        Ok(Self {
            tasks: Mutex::new(tasks),
            engine,
            store,
        })
    }

    /// Re-activate every persisted task in the transfer engine.
    ///
    /// Called once after a restart. Activation failures are logged and the
    /// record is kept: accounting history must survive an engine that is
    /// slow to come back.
    pub async fn reactivate_all(&self) {
        for task_id in self.task_ids() {
            if let Err(e) = self.engine.activate(&task_id).await {
                warn!(%task_id, error = %e, "failed to re-activate persisted task");
            }
        }
    }

    /// Register a task, activating it in the transfer engine.
    ///
    /// Idempotent: registering an identifier that is already present leaves
    /// the ledger untouched. If engine activation fails, the freshly
    /// inserted record is rolled back so the ledger never contains a task
    /// that failed to activate.
    pub async fn register_task(&self, task_id: TaskId) -> CourierResult<()> {
        {
            let mut tasks = self.tasks.lock().expect("ledger lock poisoned");
            if tasks.contains_key(&task_id) {
                debug!(%task_id, "task already registered");
                return Ok(());
            }
            tasks.insert(task_id.clone(), TaskRecord::new(task_id.clone()));
        }

        if let Err(e) = self.engine.activate(&task_id).await {
            let mut tasks = self.tasks.lock().expect("ledger lock poisoned");
            tasks.remove(&task_id);
            warn!(%task_id, error = %e, "task activation failed, registration rolled back");
            return Err(e.into());
        }

        info!(%task_id, "task registered");
        Ok(())
    }

    /// Fold one byte-count event into the ledger.
    ///
    /// An unknown task identifier is a late event from a recently removed
    /// task, not a hard error: it is logged and dropped without touching any
    /// state. Otherwise the peer counter and the task total for `direction`
    /// are incremented in one atomic step.
    pub fn record_bytes(&self, task_id: &TaskId, peer_id: &PeerId, direction: Direction, amount: u64) {
        let mut tasks = self.tasks.lock().expect("ledger lock poisoned");
        let Some(record) = tasks.get_mut(task_id) else {
            warn!(%task_id, %peer_id, amount, "byte event for unknown task dropped");
            return;
        };

        let counter = record.peers.entry(peer_id.clone()).or_default();
        match direction {
            Direction::Upload => {
                counter.uploaded_bytes += amount;
                record.uploaded_bytes += amount;
            }
            Direction::Download => {
                counter.downloaded_bytes += amount;
                record.downloaded_bytes += amount;
            }
        }
    }

    /// Remove a task: deactivate it in the engine, delete the record, and
    /// flush the ledger to disk before returning.
    ///
    /// A deactivation failure is logged but does not keep the record alive;
    /// the coordinator has already withdrawn the task. A flush failure is
    /// logged and the in-memory ledger stays authoritative until the next
    /// successful save.
    pub async fn remove_task(&self, task_id: &TaskId) {
        if let Err(e) = self.engine.deactivate(task_id).await {
            warn!(%task_id, error = %e, "engine deactivation failed during removal");
        }

        let removed = {
            let mut tasks = self.tasks.lock().expect("ledger lock poisoned");
            tasks.remove(task_id).is_some()
        };
        if removed {
            info!(%task_id, "task removed");
        } else {
            debug!(%task_id, "removal of unknown task ignored");
        }

        if let Err(e) = self.save().await {
            warn!(error = %e, "ledger flush after removal failed");
        }
    }

    /// Take a point-in-time consistent copy of every record.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let tasks = self.tasks.lock().expect("ledger lock poisoned");
        LedgerSnapshot {
            tasks: tasks.values().cloned().collect(),
        }
    }

    /// Whether a task identifier is currently tracked.
    pub fn contains(&self, task_id: &TaskId) -> bool {
        let tasks = self.tasks.lock().expect("ledger lock poisoned");
        tasks.contains_key(task_id)
    }

    /// Identifiers of all tracked tasks, in deterministic order.
    pub fn task_ids(&self) -> Vec<TaskId> {
        let tasks = self.tasks.lock().expect("ledger lock poisoned");
        tasks.keys().cloned().collect()
    }

    /// Counters for a single task, if tracked.
    pub fn stats(&self, task_id: &TaskId) -> Option<TaskRecord> {
        let tasks = self.tasks.lock().expect("ledger lock poisoned");
        tasks.get(task_id).cloned()
    }

    /// Serialize the current snapshot to the durable state file wholesale.
    pub async fn save(&self) -> Result<(), StateError> {
        let snapshot = self.snapshot();
        self.store.save(&snapshot).await?;
        debug!(tasks = snapshot.len(), "ledger state saved");
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
