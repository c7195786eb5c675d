//! Periodic ledger persistence.
//!
//! Saves a full ledger snapshot on a fixed interval and once more on
//! shutdown. Save failures are logged and skipped; the in-memory ledger
//! stays authoritative until the next successful save.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use courier_core::Ledger;

/// Interval save loop with a final flush on shutdown.
pub struct PersistenceTask {
    ledger: Arc<Ledger>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl PersistenceTask {
    pub fn new(ledger: Arc<Ledger>, interval: Duration, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            ledger,
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        info!(interval_secs = self.interval.as_secs(), "persistence task started");
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.interval,
            self.interval,
        );
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.ledger.save().await {
                        warn!(error = %e, "periodic ledger save failed");
                    }
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        // Final flush before exit, same atomicity as an ordinary save.
        match self.ledger.save().await {
            Ok(()) => info!("final ledger flush complete"),
            Err(e) => warn!(error = %e, "final ledger flush failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use courier_core::{
        Direction, EngineError, PeerId, StateStore, TaskId, TransferEngine,
    };

    struct NoopEngine;

    #[async_trait]
    impl TransferEngine for NoopEngine {
        async fn activate(&self, _task_id: &TaskId) -> Result<(), EngineError> {
            Ok(())
        }
        async fn deactivate(&self, _task_id: &TaskId) -> Result<(), EngineError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_triggers_final_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let ledger = Arc::new(Ledger::new(Arc::new(NoopEngine), StateStore::new(path.clone())));

        let task = TaskId::from("task-a");
        ledger.register_task(task.clone()).await.unwrap();
        ledger.record_bytes(&task, &PeerId::from("p1"), Direction::Upload, 42);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(
            PersistenceTask::new(ledger.clone(), Duration::from_secs(3600), shutdown_rx).run(),
        );

        // Shut down before the first periodic tick; the flush must still run.
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        let reloaded = StateStore::new(path).load().await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded[0].uploaded_bytes, 42);
    }

    #[tokio::test]
    async fn periodic_saves_happen_on_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let ledger = Arc::new(Ledger::new(Arc::new(NoopEngine), StateStore::new(path.clone())));
        ledger.register_task(TaskId::from("task-a")).await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(
            PersistenceTask::new(ledger.clone(), Duration::from_millis(20), shutdown_rx).run(),
        );

        // Wait out several intervals of real time, then check the file.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(StateStore::new(path).load().await.unwrap().len(), 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
