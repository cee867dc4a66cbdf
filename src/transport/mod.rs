//! Transport layer for the command consumer
//!
//! The MQTT engine is reached only through the narrow [`Transport`] trait so
//! that the [`gateway::Gateway`] and [`supervisor::ReconnectionSupervisor`]
//! can be driven by a scripted transport in tests.

use crate::protocol::QoS;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

pub mod gateway;
pub mod mqtt;
pub mod supervisor;

pub use gateway::{
    Ack, Gateway, MessageHandler, PublishError, Publisher, PumpOutcome, SubscribeError,
};
pub use supervisor::{
    ConnectionObserver, ConnectionState, DisconnectEvent, DisconnectOutcome,
    ReconnectionDecision, ReconnectionSupervisor, TracingObserver,
};

/// Application message delivered by the broker
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub retain: bool,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain: false,
        }
    }

    /// Payload as text, for logging
    pub fn payload_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Transport-neutral view of what the MQTT engine produced
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// CONNACK received, session is usable
    ConnectionAcknowledged,
    /// PUBLISH received on a subscribed topic
    MessageReceived(InboundMessage),
    /// Our PUBLISH left the client with this packet id
    PublishSent(u16),
    /// PUBACK (QoS 1) or PUBCOMP (QoS 2) received
    PublishAcknowledged(u16),
    /// Our SUBSCRIBE left the client with this packet id
    SubscribeSent(u16),
    /// SUBACK received
    SubscribeAcknowledged { packet_id: u16, rejected: bool },
    /// Connection dropped
    Disconnected(String),
    /// Automatic reconnection is waiting out its backoff
    Reconnecting { attempt: u32 },
    /// An automatic reconnection attempt did not reach CONNACK
    ReconnectFailed { attempt: u32, reason: String },
    /// Keep-alive traffic and other protocol housekeeping
    Other,
}

/// Errors raised by the transport itself
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("TLS configuration error: {0}")]
    Tls(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    #[error("Client request failed")]
    Client(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Narrow interface over the MQTT client engine
///
/// `publish` and `subscribe` only enqueue a request; their outcome is
/// reported later through [`Transport::poll`].
#[async_trait]
pub trait Transport: Send {
    /// Establish the initial connection and wait for CONNACK
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Single explicit reconnection attempt
    async fn reconnect(&mut self) -> Result<(), TransportError>;

    /// Enable or disable the engine's own backoff-driven reconnection
    fn set_auto_reconnect(&mut self, enabled: bool);

    fn is_auto_reconnect_enabled(&self) -> bool;

    /// Enqueue a PUBLISH
    async fn publish(
        &mut self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), TransportError>;

    /// Enqueue a SUBSCRIBE
    async fn subscribe(&mut self, filter: &str, qos: QoS) -> Result<(), TransportError>;

    /// Drive the engine for up to `timeout`; `None` when nothing happened
    async fn poll(&mut self, timeout: Duration) -> Result<Option<TransportEvent>, TransportError>;

    /// MQTT filter matching (`+` and `#` wildcards)
    fn topic_matches(&self, filter: &str, topic: &str) -> bool;
}

/// Type alias for the rumqttc-backed transport
pub type DefaultTransport = mqtt::MqttTransport;
