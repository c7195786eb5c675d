//! Detached transfer engine.
//!
//! The real peer-wire engine is an external collaborator wired in by the
//! embedding application. `DetachedEngine` stands in when none is attached:
//! activation always succeeds and no byte events are ever emitted, which
//! keeps the accounting and reporting loops fully functional on their own.

use async_trait::async_trait;
use tracing::debug;

use courier_core::{EngineError, TaskId, TransferEngine};

/// Transfer engine stand-in with no wire protocol behind it.
#[derive(Debug, Default)]
pub struct DetachedEngine;

#[async_trait]
impl TransferEngine for DetachedEngine {
    async fn activate(&self, task_id: &TaskId) -> Result<(), EngineError> {
        debug!(%task_id, "detached engine: task activated");
        Ok(())
    }

    async fn deactivate(&self, task_id: &TaskId) -> Result<(), EngineError> {
        debug!(%task_id, "detached engine: task deactivated");
        Ok(())
    }
}
