//! Error types for the courier core.
//!
//! Each collaborator boundary gets its own error enum; `CourierError` unifies
//! them for callers that cross several boundaries.

use thiserror::Error;

use crate::types::TaskId;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Errors raised by the transfer engine collaborator.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to activate task {task_id}: {reason}")]
    ActivationFailed { task_id: TaskId, reason: String },

    #[error("failed to deactivate task {task_id}: {reason}")]
    DeactivationFailed { task_id: TaskId, reason: String },

    #[error("transfer engine unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Errors from the durable state file.
#[derive(Debug, Error)]
pub enum StateError {
    /// The persisted state exists but cannot be decoded. Fatal at startup:
    /// silently discarding it would lose accounting history.
    #[error("state file {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("state file I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors on the coordinator control channel.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("failed to connect to coordinator at {url}: {reason}")]
    ConnectFailed { url: String, reason: String },

    #[error("control transport error: {reason}")]
    Transport { reason: String },

    #[error("control channel closed by coordinator")]
    Closed,

    #[error("failed to encode outbound message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors from the task-discovery source.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("task source request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("task source returned status {status}")]
    BadStatus { status: u16 },

    #[error("task source response was not valid JSON: {reason}")]
    MalformedResponse { reason: String },
}

// ----------------------------------------------------------------------------
// Unified Error Type
// ----------------------------------------------------------------------------

/// Unified error type for courier operations.
#[derive(Debug, Error)]
pub enum CourierError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("invalid configuration: {reason}")]
    Configuration { reason: String },
}

/// Result alias used throughout the courier crates.
pub type CourierResult<T> = std::result::Result<T, CourierError>;
