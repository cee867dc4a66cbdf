//! Impure I/O operations for the MQTT client
//!
//! This module owns the rumqttc client and event loop. Nothing runs in the
//! background: the event loop only advances while [`Transport::poll`],
//! [`Transport::connect`] or [`Transport::reconnect`] is being awaited.

use super::connection::{configure_mqtt_options, to_mqtt_qos, ReconnectConfig};
use super::event_router::EventRouter;
use crate::config::ClientConfig;
use crate::protocol::QoS;
use crate::transport::{Transport, TransportError, TransportEvent};
use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop};
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Capacity of the rumqttc request channel
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// rumqttc-backed transport driven by explicit polling
pub struct MqttTransport {
    client: AsyncClient,
    event_loop: EventLoop,
    connected: bool,
    auto_reconnect: bool,
    reconnect_config: ReconnectConfig,
    reconnect_attempts: u32,
    retry_at: Option<Instant>,
    connect_timeout: Duration,
}

impl MqttTransport {
    /// Build a transport resolving certificate paths against the working directory
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let base_dir = std::env::current_dir()
            .map_err(|e| TransportError::Tls(format!("cannot resolve working directory: {e}")))?;
        Self::with_base_dir(config, &base_dir)
    }

    /// Build a transport resolving certificate paths against `base_dir`
    pub fn with_base_dir(config: &ClientConfig, base_dir: &Path) -> Result<Self, TransportError> {
        let mqtt_options = configure_mqtt_options(config, base_dir)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);

        Ok(Self {
            client,
            event_loop,
            connected: false,
            auto_reconnect: false,
            reconnect_config: ReconnectConfig::from(&config.reconnect),
            reconnect_attempts: 0,
            retry_at: None,
            connect_timeout: config.connect_timeout(),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Drive the event loop until CONNACK, bounded by the connect timeout
    async fn await_connack(&mut self) -> Result<(), TransportError> {
        let event_loop = &mut self.event_loop;
        let outcome = tokio::time::timeout(self.connect_timeout, async {
            loop {
                match event_loop.poll().await {
                    Ok(event) => match EventRouter::route_mqtt_event(&event) {
                        TransportEvent::ConnectionAcknowledged => return Ok(()),
                        TransportEvent::Disconnected(reason) => {
                            return Err(TransportError::ConnectionFailed(reason))
                        }
                        _ => continue,
                    },
                    Err(e) => return Err(TransportError::ConnectionFailed(e.to_string())),
                }
            }
        })
        .await;

        match outcome {
            Ok(Ok(())) => {
                self.connected = true;
                self.reconnect_attempts = 0;
                self.retry_at = None;
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TransportError::ConnectionFailed(format!(
                "no CONNACK within {}ms",
                self.connect_timeout.as_millis()
            ))),
        }
    }

    /// Record a lost connection and, when automatic, arm the next retry
    fn mark_lost(&mut self) {
        self.connected = false;
        if self.auto_reconnect {
            self.schedule_retry();
        }
    }

    fn schedule_retry(&mut self) {
        let delay = self
            .reconnect_config
            .calculate_backoff_delay(self.reconnect_attempts + 1);
        debug!(
            target: "mqtt_transport",
            "Next reconnection attempt in {}ms",
            delay.as_millis()
        );
        self.retry_at = Some(Instant::now() + delay);
    }

    /// One automatic reconnection step while disconnected
    async fn poll_disconnected(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<TransportEvent>, TransportError> {
        if !self.auto_reconnect {
            tokio::time::sleep(timeout).await;
            return Ok(None);
        }

        if let Some(retry_at) = self.retry_at {
            let now = Instant::now();
            if now < retry_at {
                tokio::time::sleep(timeout.min(retry_at - now)).await;
                if Instant::now() < retry_at {
                    return Ok(Some(TransportEvent::Reconnecting {
                        attempt: self.reconnect_attempts + 1,
                    }));
                }
            }
        }

        self.reconnect_attempts += 1;
        let attempt = self.reconnect_attempts;
        info!("Attempting reconnection {}", attempt);

        match self.await_connack().await {
            Ok(()) => {
                info!("Reconnected to MQTT broker after {} attempt(s)", attempt);
                Ok(Some(TransportEvent::ConnectionAcknowledged))
            }
            Err(e) => {
                warn!("Reconnection attempt {} failed: {}", attempt, e);
                self.schedule_retry();
                Ok(Some(TransportEvent::ReconnectFailed {
                    attempt,
                    reason: e.to_string(),
                }))
            }
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        info!("Connecting to MQTT broker");
        self.await_connack().await?;
        info!("Connected to MQTT broker");
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<(), TransportError> {
        self.reconnect_attempts += 1;
        let result = self.await_connack().await;
        if result.is_err() && self.auto_reconnect {
            self.schedule_retry();
        }
        result
    }

    fn set_auto_reconnect(&mut self, enabled: bool) {
        self.auto_reconnect = enabled;
        if enabled && !self.connected && self.retry_at.is_none() {
            self.schedule_retry();
        }
    }

    fn is_auto_reconnect_enabled(&self) -> bool {
        self.auto_reconnect
    }

    async fn publish(
        &mut self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        self.client
            .try_publish(topic, to_mqtt_qos(qos), retain, payload)
            .map_err(|e| TransportError::Client(Box::new(e)))
    }

    async fn subscribe(&mut self, filter: &str, qos: QoS) -> Result<(), TransportError> {
        self.client
            .try_subscribe(filter, to_mqtt_qos(qos))
            .map_err(|e| TransportError::Client(Box::new(e)))
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<TransportEvent>, TransportError> {
        if !self.connected {
            return self.poll_disconnected(timeout).await;
        }

        match tokio::time::timeout(timeout, self.event_loop.poll()).await {
            Err(_) => Ok(None),
            Ok(Ok(event)) => {
                let routed = EventRouter::route_mqtt_event(&event);
                match &routed {
                    TransportEvent::ConnectionAcknowledged => {
                        self.reconnect_attempts = 0;
                        self.retry_at = None;
                    }
                    TransportEvent::Disconnected(_) => self.mark_lost(),
                    _ => {}
                }
                Ok(Some(routed))
            }
            Ok(Err(e)) => {
                self.mark_lost();
                Ok(Some(TransportEvent::Disconnected(e.to_string())))
            }
        }
    }

    fn topic_matches(&self, filter: &str, topic: &str) -> bool {
        rumqttc::mqttbytes::matches(topic, filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> ClientConfig {
        // Port 1 on loopback refuses connections immediately
        let mut config = ClientConfig::for_broker("mqtt://127.0.0.1:1");
        config.broker.connect_timeout_ms = 500;
        config.reconnect.min_wait_ms = 10;
        config.reconnect.max_wait_ms = 40;
        config
    }

    #[tokio::test]
    async fn test_initial_state() {
        let transport = MqttTransport::new(&unreachable_config()).unwrap();
        assert!(!transport.is_connected());
        assert!(!transport.is_auto_reconnect_enabled());
        assert_eq!(transport.reconnect_attempts(), 0);
    }

    #[test]
    fn test_invalid_url_rejected() {
        let config = ClientConfig::for_broker("http://localhost");
        assert!(matches!(
            MqttTransport::new(&config),
            Err(TransportError::InvalidBrokerUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_fails_without_broker() {
        let mut transport = MqttTransport::new(&unreachable_config()).unwrap();
        let result = transport.connect().await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_poll_idles_when_disconnected_without_auto_reconnect() {
        let mut transport = MqttTransport::new(&unreachable_config()).unwrap();
        let event = transport.poll(Duration::from_millis(10)).await.unwrap();
        assert_eq!(event, None);
    }

    #[tokio::test]
    async fn test_auto_reconnect_reports_attempts() {
        let mut transport = MqttTransport::new(&unreachable_config()).unwrap();
        transport.set_auto_reconnect(true);

        let mut attempts = Vec::new();
        for _ in 0..20 {
            match transport.poll(Duration::from_millis(20)).await.unwrap() {
                Some(TransportEvent::ReconnectFailed { attempt, .. }) => attempts.push(attempt),
                Some(TransportEvent::Reconnecting { .. }) | None => {}
                other => panic!("unexpected event while broker is down: {other:?}"),
            }
            if transport.reconnect_attempts() >= 2 {
                break;
            }
        }

        assert!(transport.reconnect_attempts() >= 2);
        assert!(!transport.is_connected());
        assert_eq!(attempts.first(), Some(&1));
    }

    #[tokio::test]
    async fn test_requests_are_queued_before_connect() {
        let mut transport = MqttTransport::new(&unreachable_config()).unwrap();
        transport
            .publish("command/confirm", QoS::AtLeastOnce, false, b"{}".to_vec())
            .await
            .unwrap();
        transport
            .subscribe("devices/lamp", QoS::AtLeastOnce)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_topic_matches_wildcards() {
        let transport = MqttTransport::new(&unreachable_config()).unwrap();
        assert!(transport.topic_matches("devices/lamp", "devices/lamp"));
        assert!(transport.topic_matches("devices/+", "devices/lamp"));
        assert!(transport.topic_matches("devices/#", "devices/lamp/on"));
        assert!(!transport.topic_matches("devices/fan", "devices/lamp"));
    }
}
