//! Core identifier and event types shared across the courier crates.

use std::fmt;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Identifiers
// ----------------------------------------------------------------------------

/// Opaque content fingerprint identifying one distribution task.
///
/// Assigned by the coordinator and immutable for the lifetime of the task.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Opaque identifier of a remote peer exchanging bytes for a task.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// ----------------------------------------------------------------------------
// Transfer Events
// ----------------------------------------------------------------------------

/// Direction of a byte transfer relative to this agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Upload,
    Download,
}

/// Byte-count notification emitted by the transfer engine.
///
/// One event attributes `amount` bytes moved in `direction` to a specific
/// remote peer within a specific task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub task_id: TaskId,
    pub peer_id: PeerId,
    pub direction: Direction,
    pub amount: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_serializes_transparently() {
        let id = TaskId::new("d79e2eff12625bc9");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"d79e2eff12625bc9\"");

        let back: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn direction_uses_snake_case() {
        assert_eq!(serde_json::to_string(&Direction::Upload).unwrap(), "\"upload\"");
        assert_eq!(serde_json::to_string(&Direction::Download).unwrap(), "\"download\"");
    }
}
