//! Courier runtime.
//!
//! Owns the ledger and coordinates the worker loops: the transfer-event
//! pump, the task-discovery loop, the coordinator control channel, and the
//! persistence task. There are no ambient singletons; every component gets
//! the state it needs through its constructor.
//!
//! Worker failures never escape their loops: each loop body catches and
//! logs its own errors, so a bad cycle is a logged event, not a dead agent.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use courier_core::{
    CourierConfig, CourierError, CourierResult, Ledger, StateStore, TransferEngine,
    TransferEventReceiver,
};

use crate::control::{ControlChannel, ControlDialer, WsDialer};
use crate::discovery::{HttpTaskSource, TaskDiscoveryLoop, TaskSource};
use crate::persistence::PersistenceTask;

/// Long-running agent runtime: ledger plus its worker loops.
pub struct CourierRuntime {
    config: CourierConfig,
    ledger: Arc<Ledger>,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    running: bool,
}

impl CourierRuntime {
    /// Load the ledger from the durable state file and prepare the runtime.
    ///
    /// A corrupt state file is a fatal startup error; a missing one is a
    /// normal first run. Persisted tasks are re-activated in the engine.
    pub async fn new(
        config: CourierConfig,
        engine: Arc<dyn TransferEngine>,
    ) -> CourierResult<Self> {
        config
            .validate()
            .map_err(|reason| CourierError::Configuration { reason })?;

        let store = StateStore::new(config.state.state_file());
        let ledger = Arc::new(Ledger::load(engine, store).await?);
        ledger.reactivate_all().await;

        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            ledger,
            shutdown_tx,
            handles: Vec::new(),
            running: false,
        })
    }

    /// The ledger shared with the worker loops.
    pub fn ledger(&self) -> Arc<Ledger> {
        self.ledger.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start the workers with the production task source and dialer.
    pub fn start(&mut self, events: TransferEventReceiver) {
        let source = Arc::new(HttpTaskSource::new(
            self.config.discovery.base_url.clone(),
            self.config.client_id.clone(),
        ));
        let dialer = Arc::new(WsDialer::new(self.config.control.url.clone()));
        self.start_with(events, source, dialer);
    }

    /// Start the workers with explicit collaborators. Tests substitute stub
    /// sources and dialers here.
    pub fn start_with(
        &mut self,
        events: TransferEventReceiver,
        source: Arc<dyn TaskSource>,
        dialer: Arc<dyn ControlDialer>,
    ) {
        if self.running {
            warn!("runtime already running, start ignored");
            return;
        }

        self.handles.push(tokio::spawn(event_pump(
            self.ledger.clone(),
            events,
            self.shutdown_tx.subscribe(),
        )));

        self.handles.push(tokio::spawn(
            TaskDiscoveryLoop::new(
                source,
                self.ledger.clone(),
                self.config.discovery.interval(),
                self.shutdown_tx.subscribe(),
            )
            .run(),
        ));

        self.handles.push(tokio::spawn(
            ControlChannel::new(
                dialer,
                self.ledger.clone(),
                self.config.client_id.clone(),
                self.config.control.heartbeat_interval(),
                self.config.control.reconnect_delay(),
                self.config.report.window_secs,
                self.shutdown_tx.subscribe(),
            )
            .run(),
        ));

        self.handles.push(tokio::spawn(
            PersistenceTask::new(
                self.ledger.clone(),
                self.config.state.save_interval(),
                self.shutdown_tx.subscribe(),
            )
            .run(),
        ));

        self.running = true;
        info!(client_id = %self.config.client_id, "courier runtime started");
    }

    /// Stop the workers and flush the ledger one final time.
    pub async fn shutdown(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;

        let _ = self.shutdown_tx.send(true);
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "worker task ended abnormally");
                }
            }
        }

        // The persistence task flushed on its way out, but a final save here
        // covers events pumped between its flush and the pump stopping.
        if let Err(e) = self.ledger.save().await {
            warn!(error = %e, "shutdown ledger flush failed");
        }
        info!("courier runtime stopped");
    }
}

impl Drop for CourierRuntime {
    fn drop(&mut self) {
        if self.running {
            for handle in &self.handles {
                handle.abort();
            }
        }
    }
}

/// Drain transfer-engine byte events into the ledger.
///
/// A single sequential pump preserves the order byte events were observed
/// in, which is the ordering guarantee the per-peer counters rely on.
async fn event_pump(
    ledger: Arc<Ledger>,
    mut events: TransferEventReceiver,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => ledger.record_bytes(
                        &event.task_id,
                        &event.peer_id,
                        event.direction,
                        event.amount,
                    ),
                    None => {
                        info!("transfer event channel closed");
                        return;
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("event pump stopping");
                    return;
                }
            }
        }
    }
}
