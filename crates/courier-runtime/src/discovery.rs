//! Task discovery loop.
//!
//! Polls the task source on a fixed interval and folds newly discovered
//! tasks into the ledger. Two states: `Idle` (waiting for the next tick) and
//! `Fetching` (awaiting the remote task list); a fetch attempt always comes
//! back to `Idle`, so a failed fetch never stalls the loop. There is no
//! back-off: each failure waits exactly one interval before the next try.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use courier_core::{DiscoveryError, Ledger, TaskId};

// ----------------------------------------------------------------------------
// Task Source
// ----------------------------------------------------------------------------

/// One task advertised by the task source.
///
/// The source locator (the original announcement URI) is passed through for
/// the transfer engine; only the identifier matters to the ledger.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskDescriptor {
    pub task_id: TaskId,
    #[serde(default)]
    pub source: Option<String>,
}

/// Remote source of distribution tasks assigned to this agent.
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn fetch_available(&self) -> Result<Vec<TaskDescriptor>, DiscoveryError>;
}

/// HTTP task source: `GET {base}/tasks/available?clientId={id}`.
///
/// Any non-200 response or parse failure yields an error, which the loop
/// treats as zero tasks for that cycle.
pub struct HttpTaskSource {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
}

impl HttpTaskSource {
    pub fn new(base_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            client_id: client_id.into(),
        }
    }
}

#[async_trait]
impl TaskSource for HttpTaskSource {
    async fn fetch_available(&self) -> Result<Vec<TaskDescriptor>, DiscoveryError> {
        let url = format!(
            "{}/tasks/available?clientId={}",
            self.base_url, self.client_id
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DiscoveryError::RequestFailed {
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(DiscoveryError::BadStatus {
                status: response.status().as_u16(),
            });
        }

        response
            .json::<Vec<TaskDescriptor>>()
            .await
            .map_err(|e| DiscoveryError::MalformedResponse {
                reason: e.to_string(),
            })
    }
}

// ----------------------------------------------------------------------------
// Discovery Loop
// ----------------------------------------------------------------------------

/// Loop state: either waiting for the next tick or awaiting a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    Idle,
    Fetching,
}

/// Polls the task source and registers unknown tasks with the ledger.
pub struct TaskDiscoveryLoop {
    source: Arc<dyn TaskSource>,
    ledger: Arc<Ledger>,
    interval: std::time::Duration,
    state_tx: watch::Sender<DiscoveryState>,
    shutdown: watch::Receiver<bool>,
}

impl TaskDiscoveryLoop {
    pub fn new(
        source: Arc<dyn TaskSource>,
        ledger: Arc<Ledger>,
        interval: std::time::Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (state_tx, _) = watch::channel(DiscoveryState::Idle);
        Self {
            source,
            ledger,
            interval,
            state_tx,
            shutdown,
        }
    }

    /// Observe the loop state from outside while it runs.
    pub fn watch_state(&self) -> watch::Receiver<DiscoveryState> {
        self.state_tx.subscribe()
    }

    /// Run until shutdown is signalled. Fetch failures are logged and count
    /// as an empty cycle; they never terminate the loop.
    pub async fn run(mut self) {
        info!(interval_secs = self.interval.as_secs(), "task discovery loop started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.state_tx.send_replace(DiscoveryState::Fetching);
                    self.run_cycle().await;
                    self.state_tx.send_replace(DiscoveryState::Idle);
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!("task discovery loop stopping");
                        return;
                    }
                }
            }
        }
    }

    /// One fetch-and-register cycle.
    async fn run_cycle(&self) {
        let descriptors = match self.source.fetch_available().await {
            Ok(descriptors) => descriptors,
            Err(e) => {
                warn!(error = %e, "task fetch failed, treating as empty cycle");
                return;
            }
        };

        debug!(count = descriptors.len(), "fetched available tasks");
        for descriptor in descriptors {
            if self.ledger.contains(&descriptor.task_id) {
                continue;
            }
            if let Err(e) = self.ledger.register_task(descriptor.task_id.clone()).await {
                warn!(task_id = %descriptor.task_id, error = %e, "task registration failed");
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
