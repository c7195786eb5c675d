//! Core accounting types for the courier distribution agent.
//!
//! This crate holds everything that does not need a network: the ledger and
//! its durable state file, the usage-report builder, the transfer-engine
//! collaborator trait, configuration, and error types. The worker loops that
//! drive it live in `courier-runtime`.

pub mod config;
pub mod engine;
pub mod errors;
pub mod ledger;
pub mod report;
pub mod state;
pub mod types;

pub use config::{ControlConfig, CourierConfig, DiscoveryConfig, ReportConfig, StateConfig};
pub use engine::{transfer_event_channel, TransferEngine, TransferEventReceiver, TransferEventSender};
pub use errors::{ControlError, CourierError, CourierResult, DiscoveryError, EngineError, StateError};
pub use ledger::{Ledger, LedgerSnapshot, PeerCounter, TaskRecord};
pub use report::{PeerUsage, ReportBuilder, TaskUsage, TimeWindow, UsageReport};
pub use state::StateStore;
pub use types::{Direction, PeerId, TaskId, TransferEvent};
