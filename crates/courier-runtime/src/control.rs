//! Coordinator control channel.
//!
//! A persistent bidirectional message channel to the coordinator with
//! reconnect-forever semantics and periodic heartbeat reporting. The
//! lifecycle is an explicit state machine with a single pure transition
//! function ([`transition`]), so reconnect and heartbeat logic is testable
//! without a live network; the async driver ([`ControlChannel`]) executes the
//! resulting actions against a [`ControlLink`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use courier_core::{ControlError, Ledger, ReportBuilder, TaskId, TimeWindow, UsageReport};

// ----------------------------------------------------------------------------
// State Machine
// ----------------------------------------------------------------------------

/// Control channel lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No connection; a reconnect is scheduled.
    Disconnected,
    /// Dialing the coordinator.
    Connecting,
    /// Live connection; heartbeat reporting is active.
    Connected,
    /// Shutting down; no further reconnects.
    Closing,
}

impl ChannelState {
    pub fn name(&self) -> &'static str {
        match self {
            ChannelState::Disconnected => "Disconnected",
            ChannelState::Connecting => "Connecting",
            ChannelState::Connected => "Connected",
            ChannelState::Closing => "Closing",
        }
    }
}

/// Events that drive the channel state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The reconnect delay elapsed; time to dial.
    ReconnectDelayElapsed,
    ConnectSucceeded,
    ConnectFailed { reason: String },
    /// Transport-level error on a live connection.
    TransportError { reason: String },
    /// The coordinator closed the connection.
    TransportClosed,
    ShutdownRequested,
}

/// Actions the driver must execute after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAction {
    /// Open a connection to the coordinator.
    Dial,
    /// Start the heartbeat timer, replacing any previous one.
    StartHeartbeat,
    /// Stop the heartbeat timer.
    StopHeartbeat,
    /// Arm the reconnect delay.
    ScheduleReconnect,
}

/// The one transition function for the control channel.
///
/// Events that do not apply to the current state (a stale timer firing after
/// a disconnect, say) are safe no-ops. Once `Closing` is reached no event
/// leaves it.
pub fn transition(state: ChannelState, event: &ChannelEvent) -> (ChannelState, Vec<ChannelAction>) {
    use ChannelAction::*;
    use ChannelEvent::*;
    use ChannelState::*;

    match (state, event) {
        (_, ShutdownRequested) => (Closing, vec![StopHeartbeat]),
        (Closing, _) => (Closing, vec![]),

        (Disconnected, ReconnectDelayElapsed) => (Connecting, vec![Dial]),
        (Connecting, ConnectSucceeded) => (Connected, vec![StartHeartbeat]),
        (Connecting, ConnectFailed { .. }) => (Disconnected, vec![ScheduleReconnect]),
        (Connected, TransportError { .. }) | (Connected, TransportClosed) => {
            (Disconnected, vec![StopHeartbeat, ScheduleReconnect])
        }

        // Anything else is a stale event; stay put.
        (state, _) => (state, vec![]),
    }
}

// ----------------------------------------------------------------------------
// Wire Messages
// ----------------------------------------------------------------------------

/// Outbound heartbeat envelope: `{ "type": "upload_work_report", "message": ... }`.
#[derive(Debug, Serialize)]
struct ReportEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    message: &'a UsageReport,
}

impl<'a> ReportEnvelope<'a> {
    fn new(report: &'a UsageReport) -> Self {
        Self {
            kind: "upload_work_report",
            message: report,
        }
    }
}

/// Inbound coordinator message. Unrecognized `type` values deserialize too
/// and are logged and ignored, keeping the channel forward-compatible.
#[derive(Debug, Deserialize)]
struct InboundEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: serde_json::Value,
}

/// Payload of an inbound `remove_task` message.
#[derive(Debug, Deserialize)]
struct RemoveTaskPayload {
    task_id: TaskId,
}

// ----------------------------------------------------------------------------
// Transport Seam
// ----------------------------------------------------------------------------

/// One live text-frame connection to the coordinator.
#[async_trait]
pub trait ControlLink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), ControlError>;

    /// Next inbound text frame. `None` means the coordinator closed the
    /// connection cleanly.
    async fn recv_text(&mut self) -> Option<Result<String, ControlError>>;
}

/// Opens [`ControlLink`]s; the production dialer speaks WebSocket, tests
/// substitute an in-memory double.
#[async_trait]
pub trait ControlDialer: Send + Sync {
    async fn dial(&self) -> Result<Box<dyn ControlLink>, ControlError>;
}

/// WebSocket link over tokio-tungstenite.
pub struct WsLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl ControlLink for WsLink {
    async fn send_text(&mut self, text: String) -> Result<(), ControlError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| ControlError::Transport {
                reason: e.to_string(),
            })
    }

    async fn recv_text(&mut self) -> Option<Result<String, ControlError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(_)) => return None,
                // Control frames carry no payloads we care about.
                Ok(_) => continue,
                Err(e) => {
                    return Some(Err(ControlError::Transport {
                        reason: e.to_string(),
                    }))
                }
            }
        }
    }
}

/// Production dialer for a `ws://` / `wss://` coordinator endpoint.
pub struct WsDialer {
    url: String,
}

impl WsDialer {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl ControlDialer for WsDialer {
    async fn dial(&self) -> Result<Box<dyn ControlLink>, ControlError> {
        let (stream, _) = connect_async(&self.url)
            .await
            .map_err(|e| ControlError::ConnectFailed {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(WsLink { stream }))
    }
}

// ----------------------------------------------------------------------------
// Control Channel Driver
// ----------------------------------------------------------------------------

/// Maintains the coordinator connection and the heartbeat report cycle.
pub struct ControlChannel {
    dialer: Arc<dyn ControlDialer>,
    ledger: Arc<Ledger>,
    reporter_id: String,
    heartbeat_interval: Duration,
    reconnect_delay: Duration,
    report_window_secs: u64,
    state: ChannelState,
    state_tx: watch::Sender<ChannelState>,
    shutdown: watch::Receiver<bool>,
}

impl ControlChannel {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dialer: Arc<dyn ControlDialer>,
        ledger: Arc<Ledger>,
        reporter_id: String,
        heartbeat_interval: Duration,
        reconnect_delay: Duration,
        report_window_secs: u64,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ChannelState::Disconnected);
        Self {
            dialer,
            ledger,
            reporter_id,
            heartbeat_interval,
            reconnect_delay,
            report_window_secs,
            state: ChannelState::Disconnected,
            state_tx,
            shutdown,
        }
    }

    /// Observe lifecycle transitions from outside the running channel.
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.state_tx.subscribe()
    }

    fn apply(&mut self, event: ChannelEvent) -> Vec<ChannelAction> {
        let (next, actions) = transition(self.state, &event);
        if next != self.state {
            debug!(from = self.state.name(), to = next.name(), ?event, "control channel transition");
        }
        self.state = next;
        self.state_tx.send_replace(next);
        actions
    }

    /// Run until shutdown. The channel never gives up: every disconnect
    /// schedules a reconnect after the fixed delay.
    pub async fn run(mut self) {
        info!(
            heartbeat_secs = self.heartbeat_interval.as_secs(),
            reconnect_secs = self.reconnect_delay.as_secs(),
            "control channel started"
        );

        loop {
            self.apply(ChannelEvent::ReconnectDelayElapsed);

            // The dial itself can hang on a dead endpoint; shutdown must
            // still win, so the in-flight dial is raced against the signal.
            let dialer = Arc::clone(&self.dialer);
            let mut shutdown = self.shutdown.clone();
            let dialed = tokio::select! {
                dialed = dialer.dial() => dialed,
                _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => {
                    self.apply(ChannelEvent::ShutdownRequested);
                    info!("control channel stopping");
                    return;
                }
            };

            match dialed {
                Ok(link) => {
                    self.apply(ChannelEvent::ConnectSucceeded);
                    info!("connected to coordinator");
                    let event = self.drive_connection(link).await;
                    if matches!(event, ChannelEvent::ShutdownRequested) {
                        self.apply(event);
                        return;
                    }
                    self.apply(event);
                }
                Err(e) => {
                    warn!(error = %e, "connection to coordinator failed");
                    self.apply(ChannelEvent::ConnectFailed {
                        reason: e.to_string(),
                    });
                }
            }

            // Disconnected: wait out the reconnect delay, watching for
            // shutdown so we do not dial into a closing process. `wait_for`
            // ignores updates that leave the flag unset, so the full delay
            // always elapses before the next dial.
            let mut shutdown = self.shutdown.clone();
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => {
                    self.apply(ChannelEvent::ShutdownRequested);
                    info!("control channel stopping");
                    return;
                }
            }
        }
    }

    /// Drive one live connection until it ends; returns the terminating
    /// event. The heartbeat interval lives inside this function, so a new
    /// connection always starts a fresh timer and the previous one is gone:
    /// at most one heartbeat is ever active per connection lifetime.
    async fn drive_connection(&mut self, mut link: Box<dyn ControlLink>) -> ChannelEvent {
        let mut heartbeat = tokio::time::interval_at(
            tokio::time::Instant::now() + self.heartbeat_interval,
            self.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    // Guarded: a tick only reports while connected.
                    if self.state != ChannelState::Connected {
                        continue;
                    }
                    if let Err(e) = self.send_report(link.as_mut()).await {
                        warn!(error = %e, "failed to send usage report");
                        return ChannelEvent::TransportError { reason: e.to_string() };
                    }
                }
                inbound = link.recv_text() => {
                    match inbound {
                        Some(Ok(text)) => self.handle_inbound(&text).await,
                        Some(Err(e)) => {
                            warn!(error = %e, "control transport error");
                            return ChannelEvent::TransportError { reason: e.to_string() };
                        }
                        None => {
                            warn!("disconnected from coordinator, reconnect scheduled");
                            return ChannelEvent::TransportClosed;
                        }
                    }
                }
                _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => {
                    return ChannelEvent::ShutdownRequested;
                }
            }
        }
    }

    /// Build a usage report for the trailing window and transmit it.
    async fn send_report(&self, link: &mut dyn ControlLink) -> Result<(), ControlError> {
        let snapshot = self.ledger.snapshot();
        let window = TimeWindow::trailing(self.report_window_secs);
        let report = ReportBuilder::build(&snapshot, &self.reporter_id, window);
        let payload = serde_json::to_string(&ReportEnvelope::new(&report))?;
        link.send_text(payload).await?;
        info!(
            tasks = snapshot.len(),
            upload = report.total_upload,
            download = report.total_download,
            "usage report sent"
        );
        Ok(())
    }

    /// Parse and dispatch one inbound frame. Malformed payloads and unknown
    /// message types are logged and discarded; they never close the channel.
    async fn handle_inbound(&self, text: &str) {
        let envelope: InboundEnvelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "malformed coordinator message discarded");
                return;
            }
        };

        match envelope.kind.as_str() {
            "remove_task" => match serde_json::from_value::<RemoveTaskPayload>(envelope.message) {
                Ok(payload) => self.ledger.remove_task(&payload.task_id).await,
                Err(e) => warn!(error = %e, "malformed remove_task payload discarded"),
            },
            other => {
                info!(kind = other, "unrecognized coordinator message ignored");
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_transition(
        from: ChannelState,
        event: ChannelEvent,
        to: ChannelState,
        actions: &[ChannelAction],
    ) {
        let (state, got) = transition(from, &event);
        assert_eq!(state, to, "{from:?} + {event:?}");
        assert_eq!(got, actions, "{from:?} + {event:?}");
    }

    #[test]
    fn reconnect_cycle_transitions() {
        assert_transition(
            ChannelState::Disconnected,
            ChannelEvent::ReconnectDelayElapsed,
            ChannelState::Connecting,
            &[ChannelAction::Dial],
        );
        assert_transition(
            ChannelState::Connecting,
            ChannelEvent::ConnectSucceeded,
            ChannelState::Connected,
            &[ChannelAction::StartHeartbeat],
        );
        assert_transition(
            ChannelState::Connected,
            ChannelEvent::TransportClosed,
            ChannelState::Disconnected,
            &[ChannelAction::StopHeartbeat, ChannelAction::ScheduleReconnect],
        );
        assert_transition(
            ChannelState::Connecting,
            ChannelEvent::ConnectFailed {
                reason: "refused".to_string(),
            },
            ChannelState::Disconnected,
            &[ChannelAction::ScheduleReconnect],
        );
    }

    #[test]
    fn transport_error_stops_heartbeat_and_schedules_reconnect() {
        assert_transition(
            ChannelState::Connected,
            ChannelEvent::TransportError {
                reason: "reset".to_string(),
            },
            ChannelState::Disconnected,
            &[ChannelAction::StopHeartbeat, ChannelAction::ScheduleReconnect],
        );
    }

    #[test]
    fn stale_events_are_noops() {
        // A heartbeat-era event arriving after disconnect changes nothing.
        assert_transition(
            ChannelState::Disconnected,
            ChannelEvent::TransportClosed,
            ChannelState::Disconnected,
            &[],
        );
        assert_transition(
            ChannelState::Connected,
            ChannelEvent::ConnectSucceeded,
            ChannelState::Connected,
            &[],
        );
    }

    #[test]
    fn shutdown_wins_from_every_state() {
        for state in [
            ChannelState::Disconnected,
            ChannelState::Connecting,
            ChannelState::Connected,
            ChannelState::Closing,
        ] {
            let (next, _) = transition(state, &ChannelEvent::ShutdownRequested);
            assert_eq!(next, ChannelState::Closing);
        }
        // Closing is terminal.
        assert_transition(
            ChannelState::Closing,
            ChannelEvent::ReconnectDelayElapsed,
            ChannelState::Closing,
            &[],
        );
    }

    #[test]
    fn report_envelope_has_wire_shape() {
        let report = UsageReport {
            reporter_id: "agent-1".to_string(),
            window_start: 100,
            window_end: 160,
            total_upload: 1000,
            total_download: 1000,
            per_peer: Vec::new(),
        };
        let json = serde_json::to_string(&ReportEnvelope::new(&report)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "upload_work_report");
        assert_eq!(value["message"]["reporter_id"], "agent-1");
        assert_eq!(value["message"]["total_upload"], 1000);
    }

    #[test]
    fn inbound_envelope_tolerates_missing_message() {
        let envelope: InboundEnvelope =
            serde_json::from_str(r#"{"type":"server_notice"}"#).unwrap();
        assert_eq!(envelope.kind, "server_notice");
        assert!(envelope.message.is_null());
    }
}
