//! Publish/subscribe gateway
//!
//! Wraps a [`Transport`] behind request/response calls. `publish` and
//! `subscribe` keep polling the transport until their acknowledgement shows
//! up or the command timeout runs out. Application messages that arrive in
//! the meantime are parked and handed out by the next [`Gateway::pump`].

use crate::observability::metrics::metrics;
use crate::protocol::{QoS, Topic, TopicError};
use crate::transport::supervisor::{
    ConnectionObserver, ConnectionState, DisconnectOutcome, ReconnectionSupervisor,
    TracingObserver,
};
use crate::transport::{InboundMessage, Transport, TransportError, TransportEvent};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

/// Successful publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// Packet id acknowledged by the broker; `None` for QoS 0
    pub packet_id: Option<u16>,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Publish was not acknowledged within the command timeout")]
    RequestTimeout,
    #[error("Cannot publish while {state}")]
    NotConnected { state: ConnectionState },
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error(transparent)]
    InvalidTopic(#[from] TopicError),
    #[error("Broker rejected subscription to {topic}")]
    SubscribeRejected { topic: String },
    #[error("Cannot subscribe while {state}")]
    NotConnected { state: ConnectionState },
    #[error("Subscription was not acknowledged within the command timeout")]
    RequestTimeout,
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Outcome of one [`Gateway::pump`] window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    Idle,
    /// The transport is waiting out a reconnection backoff
    Reconnecting,
}

/// Anything that can publish on behalf of a message handler
#[async_trait]
pub trait Publisher: Send {
    async fn publish(
        &mut self,
        topic: &Topic,
        payload: Vec<u8>,
        qos: QoS,
    ) -> Result<Ack, PublishError>;
}

/// Callback registered for a subscription
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &InboundMessage, publisher: &mut dyn Publisher);
}

struct Registration {
    topic: Topic,
    qos: QoS,
    handler: Arc<dyn MessageHandler>,
}

/// Exclusive owner of the transport handle
pub struct Gateway<T: Transport> {
    transport: T,
    supervisor: ReconnectionSupervisor,
    registrations: Vec<Registration>,
    pending: VecDeque<InboundMessage>,
    command_timeout: Duration,
}

impl<T: Transport> Gateway<T> {
    pub fn new(transport: T, command_timeout: Duration) -> Self {
        Self {
            transport,
            supervisor: ReconnectionSupervisor::new().with_observer(Arc::new(TracingObserver)),
            registrations: Vec::new(),
            pending: VecDeque::new(),
            command_timeout,
        }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn ConnectionObserver>) {
        self.supervisor.add_observer(observer);
    }

    pub fn state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Topics with a registered handler, in registration order
    pub fn subscribed_topics(&self) -> impl Iterator<Item = &Topic> {
        self.registrations.iter().map(|r| &r.topic)
    }

    pub fn set_auto_reconnect(&mut self, enabled: bool) {
        info!(
            "Automatic reconnection {}",
            if enabled { "enabled" } else { "disabled" }
        );
        self.transport.set_auto_reconnect(enabled);
    }

    /// Initial connection
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        self.supervisor.begin_connect();
        match self.transport.connect().await {
            Ok(()) => {
                self.supervisor.on_connected();
                Ok(())
            }
            Err(e) => {
                self.supervisor
                    .on_connect_failed(&e.to_string(), self.transport.is_auto_reconnect_enabled());
                Err(e)
            }
        }
    }

    /// Subscribe `topic` and route its messages to `handler`
    ///
    /// Subscribing an already registered topic replaces its handler.
    pub async fn subscribe(
        &mut self,
        topic: &str,
        qos: QoS,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), SubscribeError> {
        let topic = Topic::parse(topic)?;

        let state = self.supervisor.state();
        if state != ConnectionState::Connected {
            return Err(SubscribeError::NotConnected { state });
        }

        self.transport.subscribe(topic.as_str(), qos).await?;
        if let Err(e) = self.await_subscribe_ack(&topic).await {
            metrics().mqtt_subscribe_failed();
            return Err(e);
        }

        metrics().mqtt_subscribed();
        info!("Subscribed to {}", topic);

        match self.registrations.iter_mut().find(|r| r.topic == topic) {
            Some(existing) => {
                existing.qos = qos;
                existing.handler = handler;
            }
            None => self.registrations.push(Registration {
                topic,
                qos,
                handler,
            }),
        }
        Ok(())
    }

    /// Drive the transport for up to `timeout`, dispatching messages in arrival order
    pub async fn pump(&mut self, timeout: Duration) -> Result<PumpOutcome, TransportError> {
        let deadline = Instant::now() + timeout;
        self.drain_pending().await;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(PumpOutcome::Idle);
            }

            let Some(event) = self.transport.poll(remaining).await? else {
                return Ok(PumpOutcome::Idle);
            };

            match event {
                TransportEvent::MessageReceived(message) => {
                    self.dispatch(message).await;
                    self.drain_pending().await;
                }
                TransportEvent::Reconnecting { attempt } => {
                    debug!("Automatic reconnection pending (attempt {})", attempt);
                    return Ok(PumpOutcome::Reconnecting);
                }
                failed @ TransportEvent::ReconnectFailed { .. } => {
                    self.absorb(failed).await;
                    return Ok(PumpOutcome::Reconnecting);
                }
                other => self.absorb(other).await,
            }
        }
    }

    /// Apply connection-level events that arrive outside an explicit wait
    async fn absorb(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ConnectionAcknowledged => {
                self.supervisor.on_connected();
                self.resubscribe_all().await;
            }
            TransportEvent::Disconnected(reason) => {
                let outcome = self
                    .supervisor
                    .handle_disconnect(&reason, &mut self.transport)
                    .await;
                if outcome == DisconnectOutcome::Reconnected {
                    self.resubscribe_all().await;
                }
            }
            TransportEvent::ReconnectFailed { attempt, reason } => {
                warn!("Automatic reconnection attempt {} failed: {}", attempt, reason);
                self.supervisor.on_auto_attempt_failed(&reason);
            }
            TransportEvent::SubscribeAcknowledged {
                packet_id,
                rejected: true,
            } => {
                warn!("Broker rejected subscription (packet {})", packet_id);
            }
            TransportEvent::MessageReceived(message) => self.pending.push_back(message),
            other => debug!(target: "mqtt_transport", "Ignoring transport event: {:?}", other),
        }
    }

    /// The broker forgets subscriptions on a clean session, so re-issue them
    async fn resubscribe_all(&mut self) {
        for registration in &self.registrations {
            match self
                .transport
                .subscribe(registration.topic.as_str(), registration.qos)
                .await
            {
                Ok(()) => debug!(target: "mqtt_transport", "Re-subscribed to: {}", registration.topic),
                Err(e) => error!("Failed to re-subscribe to {}: {}", registration.topic, e),
            }
        }
    }

    async fn drain_pending(&mut self) {
        while let Some(message) = self.pending.pop_front() {
            self.dispatch(message).await;
        }
    }

    async fn dispatch(&mut self, message: InboundMessage) {
        metrics().mqtt_message_received();

        let handler = self
            .registrations
            .iter()
            .find(|r| self.transport.topic_matches(r.topic.as_str(), &message.topic))
            .map(|r| Arc::clone(&r.handler));

        match handler {
            Some(handler) => {
                let span = crate::mqtt_span!(topic = %message.topic);
                handler.handle(&message, self).instrument(span).await;
            }
            None => {
                metrics().mqtt_message_unhandled();
                debug!("No handler registered for topic {}", message.topic);
            }
        }
    }

    async fn await_publish_ack(&mut self) -> Result<Ack, PublishError> {
        let deadline = Instant::now() + self.command_timeout;
        let mut sent = None;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(PublishError::RequestTimeout);
            }

            match self.transport.poll(remaining).await? {
                None => continue,
                Some(TransportEvent::PublishSent(packet_id)) if sent.is_none() => {
                    sent = Some(packet_id);
                }
                Some(TransportEvent::PublishAcknowledged(packet_id)) if sent == Some(packet_id) => {
                    return Ok(Ack {
                        packet_id: Some(packet_id),
                    });
                }
                Some(TransportEvent::Disconnected(reason)) => {
                    self.absorb(TransportEvent::Disconnected(reason.clone()))
                        .await;
                    return Err(TransportError::ConnectionLost(reason).into());
                }
                Some(TransportEvent::Reconnecting { .. }) => {
                    return Err(
                        TransportError::ConnectionLost("reconnection in progress".to_string())
                            .into(),
                    );
                }
                Some(TransportEvent::ReconnectFailed { attempt, reason }) => {
                    self.absorb(TransportEvent::ReconnectFailed {
                        attempt,
                        reason: reason.clone(),
                    })
                    .await;
                    return Err(TransportError::ConnectionLost(reason).into());
                }
                Some(other) => self.absorb(other).await,
            }
        }
    }

    async fn await_subscribe_ack(&mut self, topic: &Topic) -> Result<(), SubscribeError> {
        let deadline = Instant::now() + self.command_timeout;
        let mut sent = None;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SubscribeError::RequestTimeout);
            }

            match self.transport.poll(remaining).await? {
                None => continue,
                Some(TransportEvent::SubscribeSent(packet_id)) if sent.is_none() => {
                    sent = Some(packet_id);
                }
                Some(TransportEvent::SubscribeAcknowledged {
                    packet_id,
                    rejected,
                }) if sent == Some(packet_id) => {
                    return if rejected {
                        Err(SubscribeError::SubscribeRejected {
                            topic: topic.to_string(),
                        })
                    } else {
                        Ok(())
                    };
                }
                Some(TransportEvent::Disconnected(reason)) => {
                    self.absorb(TransportEvent::Disconnected(reason.clone()))
                        .await;
                    return Err(TransportError::ConnectionLost(reason).into());
                }
                Some(TransportEvent::Reconnecting { .. }) => {
                    return Err(
                        TransportError::ConnectionLost("reconnection in progress".to_string())
                            .into(),
                    );
                }
                Some(TransportEvent::ReconnectFailed { attempt, reason }) => {
                    self.absorb(TransportEvent::ReconnectFailed {
                        attempt,
                        reason: reason.clone(),
                    })
                    .await;
                    return Err(TransportError::ConnectionLost(reason).into());
                }
                Some(other) => self.absorb(other).await,
            }
        }
    }
}

#[async_trait]
impl<T: Transport> Publisher for Gateway<T> {
    async fn publish(
        &mut self,
        topic: &Topic,
        payload: Vec<u8>,
        qos: QoS,
    ) -> Result<Ack, PublishError> {
        let state = self.supervisor.state();
        if state != ConnectionState::Connected {
            metrics().mqtt_publish_failed();
            return Err(PublishError::NotConnected { state });
        }

        if let Err(e) = self.transport.publish(topic.as_str(), qos, false, payload).await {
            metrics().mqtt_publish_failed();
            return Err(e.into());
        }

        if !qos.expects_ack() {
            metrics().mqtt_message_published();
            return Ok(Ack { packet_id: None });
        }

        let result = self.await_publish_ack().await;
        match &result {
            Ok(_) => metrics().mqtt_message_published(),
            Err(PublishError::RequestTimeout) => metrics().mqtt_publish_timed_out(),
            Err(_) => metrics().mqtt_publish_failed(),
        }
        result
    }
}
