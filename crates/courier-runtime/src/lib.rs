//! Worker loops and orchestration for the courier distribution agent.
//!
//! `courier-core` holds the accounting state; this crate drives it: a task
//! discovery loop polling the coordinator's task source, a reconnecting
//! WebSocket control channel with heartbeat usage reports, a periodic
//! persistence task, and the [`CourierRuntime`] that wires them together
//! around one shared [`courier_core::Ledger`].

pub mod control;
pub mod discovery;
pub mod engine;
pub mod persistence;
pub mod runtime;

pub use control::{
    transition, ChannelAction, ChannelEvent, ChannelState, ControlChannel, ControlDialer,
    ControlLink, WsDialer,
};
pub use discovery::{DiscoveryState, HttpTaskSource, TaskDescriptor, TaskDiscoveryLoop, TaskSource};
pub use engine::DetachedEngine;
pub use persistence::PersistenceTask;
pub use runtime::CourierRuntime;
