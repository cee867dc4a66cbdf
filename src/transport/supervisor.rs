//! Reconnection supervisor
//!
//! Sole owner of [`ConnectionState`]. Every other component reads the state
//! and asks the supervisor to transition it.

use crate::observability::metrics::metrics;
use crate::transport::Transport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Connection lifecycle as seen by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Emitted on every entry into [`ConnectionState::Reconnecting`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisconnectEvent {
    pub reason: String,
    pub at: DateTime<Utc>,
    pub auto_reconnect: bool,
}

/// What the supervisor does about a disconnect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectionDecision {
    /// The transport's own backoff brings the connection back
    AwaitTransport,
    /// One explicit reconnect call, issued now
    ManualAttempt,
}

/// Result of [`ReconnectionSupervisor::handle_disconnect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    AwaitingTransport,
    Reconnected,
    ReconnectFailed,
}

/// Receives state transitions and disconnect events
pub trait ConnectionObserver: Send + Sync {
    fn on_transition(&self, _from: ConnectionState, _to: ConnectionState) {}

    fn on_disconnect(&self, _event: &DisconnectEvent) {}
}

/// Logs transitions and feeds the global metrics collector
#[derive(Debug, Default)]
pub struct TracingObserver;

impl TracingObserver {
    /// Log connection state transition (pure logging function)
    pub fn log_state_transition(from: ConnectionState, to: ConnectionState) {
        match (from, to) {
            (ConnectionState::Connecting, ConnectionState::Connected) => {
                info!("MQTT connection established successfully");
            }
            (ConnectionState::Connected, ConnectionState::Reconnecting) => {
                warn!("MQTT connection lost");
            }
            (ConnectionState::Reconnecting, ConnectionState::Connecting) => {
                info!("Attempting reconnect");
            }
            (ConnectionState::Connecting, ConnectionState::Reconnecting) => {
                warn!("MQTT connection attempt failed");
            }
            _ => {
                info!("MQTT connection state: {} -> {}", from, to);
            }
        }
    }
}

impl ConnectionObserver for TracingObserver {
    fn on_transition(&self, from: ConnectionState, to: ConnectionState) {
        Self::log_state_transition(from, to);
        let collector = metrics();
        collector.state_transition();
        if to == ConnectionState::Connected {
            collector.mqtt_connection_established();
        }
    }

    fn on_disconnect(&self, event: &DisconnectEvent) {
        if event.auto_reconnect {
            warn!(
                reason = %event.reason,
                at = %event.at.to_rfc3339(),
                "MQTT disconnected; auto-reconnect is enabled, waiting for the client to reconnect"
            );
        } else {
            warn!(
                reason = %event.reason,
                at = %event.at.to_rfc3339(),
                "MQTT disconnected; auto-reconnect is disabled"
            );
        }

        let collector = metrics();
        collector.mqtt_connection_lost();
        match serde_json::to_string(&collector.get_metrics()) {
            Ok(snapshot) => info!(metrics = %snapshot, "Metrics at disconnect"),
            Err(e) => debug!("Failed to serialize metrics snapshot: {}", e),
        }
    }
}

/// State machine reacting to connection events
pub struct ReconnectionSupervisor {
    state: ConnectionState,
    observers: Vec<Arc<dyn ConnectionObserver>>,
}

impl Default for ReconnectionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconnectionSupervisor {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ConnectionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn add_observer(&mut self, observer: Arc<dyn ConnectionObserver>) {
        self.observers.push(observer);
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Choose between waiting on the transport and a manual attempt (pure function)
    pub fn decide(auto_reconnect: bool) -> ReconnectionDecision {
        if auto_reconnect {
            ReconnectionDecision::AwaitTransport
        } else {
            ReconnectionDecision::ManualAttempt
        }
    }

    fn transition(&mut self, to: ConnectionState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        for observer in &self.observers {
            observer.on_transition(from, to);
        }
    }

    fn enter_reconnecting(&mut self, reason: &str, auto_reconnect: bool) {
        self.transition(ConnectionState::Reconnecting);
        let event = DisconnectEvent {
            reason: reason.to_string(),
            at: Utc::now(),
            auto_reconnect,
        };
        for observer in &self.observers {
            observer.on_disconnect(&event);
        }
    }

    /// A connection attempt is starting
    pub fn begin_connect(&mut self) {
        metrics().mqtt_connection_attempt();
        self.transition(ConnectionState::Connecting);
    }

    /// CONNACK observed
    pub fn on_connected(&mut self) {
        self.transition(ConnectionState::Connected);
    }

    /// A connection attempt failed
    pub fn on_connect_failed(&mut self, reason: &str, auto_reconnect: bool) {
        metrics().mqtt_connection_failed();
        self.enter_reconnecting(reason, auto_reconnect);
    }

    /// An automatic attempt failed; the transport keeps retrying on its own
    pub fn on_auto_attempt_failed(&mut self, reason: &str) {
        self.on_connect_failed(reason, true);
        self.transition(ConnectionState::Connecting);
    }

    /// React to a disconnect notification from the transport
    ///
    /// With auto-reconnect the supervisor only moves to `Connecting` and waits
    /// for a later CONNACK. Without it, exactly one `reconnect` call is made.
    pub async fn handle_disconnect<T: Transport + ?Sized>(
        &mut self,
        reason: &str,
        transport: &mut T,
    ) -> DisconnectOutcome {
        let auto_reconnect = transport.is_auto_reconnect_enabled();
        self.enter_reconnecting(reason, auto_reconnect);

        match Self::decide(auto_reconnect) {
            ReconnectionDecision::AwaitTransport => {
                self.transition(ConnectionState::Connecting);
                DisconnectOutcome::AwaitingTransport
            }
            ReconnectionDecision::ManualAttempt => {
                self.begin_connect();
                match transport.reconnect().await {
                    Ok(()) => {
                        metrics().mqtt_manual_reconnect_succeeded();
                        self.on_connected();
                        DisconnectOutcome::Reconnected
                    }
                    Err(e) => {
                        error!("Manual reconnect failed: {}", e);
                        metrics().mqtt_manual_reconnect_failed();
                        self.on_connect_failed(&e.to_string(), auto_reconnect);
                        DisconnectOutcome::ReconnectFailed
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{MockTransport, RecordingObserver};

    fn supervisor_with_recorder() -> (ReconnectionSupervisor, Arc<RecordingObserver>) {
        let recorder = Arc::new(RecordingObserver::new());
        let supervisor = ReconnectionSupervisor::new().with_observer(recorder.clone());
        (supervisor, recorder)
    }

    #[test]
    fn test_initial_state_is_disconnected() {
        let supervisor = ReconnectionSupervisor::new();
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
        assert!(!supervisor.is_connected());
    }

    #[test]
    fn test_decide() {
        assert_eq!(
            ReconnectionSupervisor::decide(true),
            ReconnectionDecision::AwaitTransport
        );
        assert_eq!(
            ReconnectionSupervisor::decide(false),
            ReconnectionDecision::ManualAttempt
        );
    }

    #[test]
    fn test_connect_sequence() {
        let (mut supervisor, recorder) = supervisor_with_recorder();
        supervisor.begin_connect();
        supervisor.on_connected();

        assert_eq!(supervisor.state(), ConnectionState::Connected);
        assert_eq!(
            recorder.states(),
            vec![ConnectionState::Connecting, ConnectionState::Connected]
        );
        assert!(recorder.disconnects().is_empty());
    }

    #[test]
    fn test_connect_failure_enters_reconnecting_with_event() {
        let (mut supervisor, recorder) = supervisor_with_recorder();
        supervisor.begin_connect();
        supervisor.on_connect_failed("refused", false);

        assert_eq!(supervisor.state(), ConnectionState::Reconnecting);
        let disconnects = recorder.disconnects();
        assert_eq!(disconnects.len(), 1);
        assert_eq!(disconnects[0].reason, "refused");
        assert!(!disconnects[0].auto_reconnect);
    }

    #[test]
    fn test_failed_auto_attempt_reenters_reconnecting() {
        let (mut supervisor, recorder) = supervisor_with_recorder();
        supervisor.begin_connect();
        supervisor.on_connected();
        supervisor.on_auto_attempt_failed("connection refused");

        use ConnectionState::*;
        assert_eq!(
            recorder.states(),
            vec![Connecting, Connected, Reconnecting, Connecting]
        );
        let disconnects = recorder.disconnects();
        assert_eq!(disconnects.len(), 1);
        assert_eq!(disconnects[0].reason, "connection refused");
        assert!(disconnects[0].auto_reconnect);
    }

    #[tokio::test]
    async fn test_disconnect_with_auto_reconnect_waits_for_transport() {
        let (mut supervisor, recorder) = supervisor_with_recorder();
        let mut transport = MockTransport::new();
        transport.set_auto_reconnect(true);
        supervisor.begin_connect();
        supervisor.on_connected();

        let outcome = supervisor
            .handle_disconnect("network error", &mut transport)
            .await;

        assert_eq!(outcome, DisconnectOutcome::AwaitingTransport);
        assert_eq!(supervisor.state(), ConnectionState::Connecting);
        assert_eq!(transport.reconnect_calls(), 0);

        let disconnects = recorder.disconnects();
        assert_eq!(disconnects.len(), 1);
        assert!(disconnects[0].auto_reconnect);

        supervisor.on_connected();
        assert_eq!(
            recorder.states(),
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Reconnecting,
                ConnectionState::Connecting,
                ConnectionState::Connected,
            ]
        );
    }

    #[tokio::test]
    async fn test_disconnect_without_auto_reconnect_makes_one_attempt() {
        let (mut supervisor, recorder) = supervisor_with_recorder();
        let mut transport = MockTransport::new();
        transport.push_reconnect_result(Ok(()));
        supervisor.begin_connect();
        supervisor.on_connected();

        let outcome = supervisor.handle_disconnect("broker gone", &mut transport).await;

        assert_eq!(outcome, DisconnectOutcome::Reconnected);
        assert_eq!(supervisor.state(), ConnectionState::Connected);
        assert_eq!(transport.reconnect_calls(), 1);
        assert!(!recorder.disconnects()[0].auto_reconnect);
    }

    #[tokio::test]
    async fn test_failed_manual_attempt_stays_reconnecting() {
        let (mut supervisor, recorder) = supervisor_with_recorder();
        let mut transport = MockTransport::new();
        transport.push_reconnect_result(Err("still down".to_string()));
        supervisor.begin_connect();
        supervisor.on_connected();

        let outcome = supervisor.handle_disconnect("broker gone", &mut transport).await;

        assert_eq!(outcome, DisconnectOutcome::ReconnectFailed);
        assert_eq!(supervisor.state(), ConnectionState::Reconnecting);
        assert_eq!(transport.reconnect_calls(), 1);

        // Both entries into Reconnecting are reported
        let disconnects = recorder.disconnects();
        assert_eq!(disconnects.len(), 2);
        assert_eq!(disconnects[0].reason, "broker gone");
        assert!(disconnects[1].reason.contains("still down"));
    }

    #[test]
    fn test_repeated_transition_is_not_reported() {
        let (mut supervisor, recorder) = supervisor_with_recorder();
        supervisor.on_connected();
        supervisor.on_connected();
        assert_eq!(recorder.states(), vec![ConnectionState::Connected]);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
    }
}
