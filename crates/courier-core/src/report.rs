//! Usage report generation.
//!
//! A report is a pure function of a ledger snapshot and a time window: raw
//! per-task peer counters are folded into a per-peer aggregate that keeps a
//! per-task breakdown under each peer. Top-level totals are accumulated from
//! the task totals during the same fold, so the report invariant (report
//! total == sum of task totals) holds by construction.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::ledger::LedgerSnapshot;
use crate::types::{PeerId, TaskId};

// ----------------------------------------------------------------------------
// Time Window
// ----------------------------------------------------------------------------

/// Closed time window `[start, end]` in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: u64,
    pub end: u64,
}

impl TimeWindow {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// The trailing `secs` seconds ending now.
    pub fn trailing(secs: u64) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            start: now.saturating_sub(secs),
            end: now,
        }
    }
}

// ----------------------------------------------------------------------------
// Report Shapes
// ----------------------------------------------------------------------------

/// Per-task byte breakdown within one peer entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskUsage {
    pub task_id: TaskId,
    pub upload: u64,
    pub download: u64,
}

/// Aggregate volumes for one peer across all tasks it participated in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerUsage {
    pub peer_id: PeerId,
    pub total_upload: u64,
    pub total_download: u64,
    pub per_task: Vec<TaskUsage>,
}

/// Coordinator-facing rollup of ledger counters over a time window.
///
/// Built fresh on each report cycle; never persisted as ledger state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
    pub reporter_id: String,
    pub window_start: u64,
    pub window_end: u64,
    pub total_upload: u64,
    pub total_download: u64,
    pub per_peer: Vec<PeerUsage>,
}

// ----------------------------------------------------------------------------
// Report Builder
// ----------------------------------------------------------------------------

/// Builds usage reports from ledger snapshots.
pub struct ReportBuilder;

impl ReportBuilder {
    /// Roll the snapshot up into a report for the given window.
    ///
    /// Peer order and per-task list order follow the snapshot's own order,
    /// which makes the output deterministic for a given snapshot.
    pub fn build(snapshot: &LedgerSnapshot, reporter_id: &str, window: TimeWindow) -> UsageReport {
        let mut total_upload = 0u64;
        let mut total_download = 0u64;
        let mut per_peer: BTreeMap<PeerId, PeerUsage> = BTreeMap::new();

        for record in &snapshot.tasks {
            total_upload += record.uploaded_bytes;
            total_download += record.downloaded_bytes;

            for (peer_id, counter) in &record.peers {
                let entry = per_peer.entry(peer_id.clone()).or_insert_with(|| PeerUsage {
                    peer_id: peer_id.clone(),
                    total_upload: 0,
                    total_download: 0,
                    per_task: Vec::new(),
                });
                entry.total_upload += counter.uploaded_bytes;
                entry.total_download += counter.downloaded_bytes;
                entry.per_task.push(TaskUsage {
                    task_id: record.task_id.clone(),
                    upload: counter.uploaded_bytes,
                    download: counter.downloaded_bytes,
                });
            }
        }

        UsageReport {
            reporter_id: reporter_id.to_string(),
            window_start: window.start,
            window_end: window.end,
            total_upload,
            total_download,
            per_peer: per_peer.into_values().collect(),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{PeerCounter, TaskRecord};
    use std::collections::BTreeMap;

    fn record(task: &str, peers: &[(&str, u64, u64)]) -> TaskRecord {
        let mut map = BTreeMap::new();
        let mut up = 0;
        let mut down = 0;
        for (peer, uploaded, downloaded) in peers {
            up += uploaded;
            down += downloaded;
            map.insert(
                PeerId::from(*peer),
                PeerCounter {
                    uploaded_bytes: *uploaded,
                    downloaded_bytes: *downloaded,
                },
            );
        }
        TaskRecord {
            task_id: TaskId::from(task),
            uploaded_bytes: up,
            downloaded_bytes: down,
            peers: map,
        }
    }

    #[test]
    fn empty_snapshot_yields_empty_report() {
        let report = ReportBuilder::build(&LedgerSnapshot::default(), "agent", TimeWindow::new(0, 60));
        assert_eq!(report.total_upload, 0);
        assert_eq!(report.total_download, 0);
        assert!(report.per_peer.is_empty());
    }

    #[test]
    fn shared_peer_aggregates_across_tasks() {
        let snapshot = LedgerSnapshot {
            tasks: vec![
                record("task-a", &[("peer-p", 100, 0)]),
                record("task-b", &[("peer-p", 200, 0)]),
            ],
        };

        let report = ReportBuilder::build(&snapshot, "agent", TimeWindow::new(0, 60));
        assert_eq!(report.total_upload, 300);
        assert_eq!(report.per_peer.len(), 1);

        let peer = &report.per_peer[0];
        assert_eq!(peer.peer_id, PeerId::from("peer-p"));
        assert_eq!(peer.total_upload, 300);
        assert_eq!(peer.per_task.len(), 2);
        assert_eq!(peer.per_task[0].upload, 100);
        assert_eq!(peer.per_task[1].upload, 200);
    }

    #[test]
    fn report_totals_equal_sum_of_task_totals() {
        let snapshot = LedgerSnapshot {
            tasks: vec![
                record("task-a", &[("p1", 10, 5), ("p2", 20, 15)]),
                record("task-b", &[("p2", 30, 25), ("p3", 40, 35)]),
            ],
        };

        let report = ReportBuilder::build(&snapshot, "agent", TimeWindow::new(0, 60));
        let task_up: u64 = snapshot.tasks.iter().map(|t| t.uploaded_bytes).sum();
        let task_down: u64 = snapshot.tasks.iter().map(|t| t.downloaded_bytes).sum();
        assert_eq!(report.total_upload, task_up);
        assert_eq!(report.total_download, task_down);

        // Peer aggregates also sum to the same totals.
        let peer_up: u64 = report.per_peer.iter().map(|p| p.total_upload).sum();
        assert_eq!(peer_up, task_up);
    }

    #[test]
    fn output_is_deterministic_for_a_snapshot() {
        let snapshot = LedgerSnapshot {
            tasks: vec![
                record("task-a", &[("p2", 1, 2), ("p1", 3, 4)]),
                record("task-b", &[("p1", 5, 6)]),
            ],
        };

        let first = ReportBuilder::build(&snapshot, "agent", TimeWindow::new(0, 60));
        let second = ReportBuilder::build(&snapshot, "agent", TimeWindow::new(0, 60));
        assert_eq!(first, second);
        assert_eq!(first.per_peer[0].peer_id, PeerId::from("p1"));
    }

    #[test]
    fn window_bounds_are_carried_through() {
        let report =
            ReportBuilder::build(&LedgerSnapshot::default(), "agent", TimeWindow::new(100, 160));
        assert_eq!(report.window_start, 100);
        assert_eq!(report.window_end, 160);
        assert_eq!(report.reporter_id, "agent");
    }

    #[test]
    fn trailing_window_spans_requested_length() {
        let window = TimeWindow::trailing(60);
        assert_eq!(window.end - window.start, 60);
    }
}
