//! Transfer engine collaborator boundary.
//!
//! The peer-wire transfer protocol (handshake, piece selection, choking) is
//! not part of this crate. The ledger only needs two things from it: the
//! ability to activate and deactivate a task, and a stream of byte-count
//! events attributed to (task, peer) pairs.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::EngineError;
use crate::types::{TaskId, TransferEvent};

/// Default buffer size for the transfer event channel. Byte events can be
/// bursty when several peers are active on the same task.
pub const TRANSFER_EVENT_BUFFER: usize = 256;

/// Handle to the component performing actual peer-wire data exchange.
///
/// Implementations must be safe to call from several worker loops at once;
/// the ledger holds the engine behind an `Arc`.
#[async_trait]
pub trait TransferEngine: Send + Sync {
    /// Begin distributing the given task. May fail on network or resource
    /// errors; the caller is responsible for not keeping accounting state
    /// for a task that never activated.
    async fn activate(&self, task_id: &TaskId) -> Result<(), EngineError>;

    /// Stop distributing the given task.
    async fn deactivate(&self, task_id: &TaskId) -> Result<(), EngineError>;
}

/// Sender half handed to the engine for byte-count notifications.
pub type TransferEventSender = mpsc::Sender<TransferEvent>;

/// Receiver half drained by the runtime event pump.
pub type TransferEventReceiver = mpsc::Receiver<TransferEvent>;

/// Create the transfer event channel connecting the engine to the ledger.
pub fn transfer_event_channel() -> (TransferEventSender, TransferEventReceiver) {
    mpsc::channel(TRANSFER_EVENT_BUFFER)
}
