//! Mock implementations for testing
//!
//! Provides a scripted [`Transport`], a recording connection observer and a
//! recording message handler so the gateway, supervisor and session can be
//! exercised without a broker.

use crate::protocol::QoS;
use crate::transport::{
    ConnectionObserver, ConnectionState, DisconnectEvent, InboundMessage, MessageHandler,
    Publisher, Transport, TransportError, TransportEvent,
};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// A publish request seen by [`MockTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

impl PublishedMessage {
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Scripted transport
///
/// `poll` hands out queued events in order and sleeps for the full timeout
/// once the queue is empty. QoS 1/2 publishes and subscribes append their
/// own sent/acknowledged events to the back of the queue.
#[derive(Debug)]
pub struct MockTransport {
    events: VecDeque<TransportEvent>,
    published: Vec<PublishedMessage>,
    subscriptions: Vec<(String, QoS)>,
    rejected_filters: HashSet<String>,
    reconnect_results: VecDeque<Result<(), String>>,
    connect_failure: Option<String>,
    connect_calls: u32,
    reconnect_calls: u32,
    auto_reconnect: bool,
    acknowledge_publishes: bool,
    next_packet_id: u16,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            events: VecDeque::new(),
            published: Vec::new(),
            subscriptions: Vec::new(),
            rejected_filters: HashSet::new(),
            reconnect_results: VecDeque::new(),
            connect_failure: None,
            connect_calls: 0,
            reconnect_calls: 0,
            auto_reconnect: false,
            acknowledge_publishes: true,
            next_packet_id: 1,
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failing_connect(reason: &str) -> Self {
        Self {
            connect_failure: Some(reason.to_string()),
            ..Default::default()
        }
    }

    pub fn push_event(&mut self, event: TransportEvent) {
        self.events.push_back(event);
    }

    pub fn push_message(&mut self, topic: &str, payload: &str) {
        self.push_event(TransportEvent::MessageReceived(InboundMessage::new(
            topic,
            payload.as_bytes().to_vec(),
        )));
    }

    pub fn push_disconnect(&mut self, reason: &str) {
        self.push_event(TransportEvent::Disconnected(reason.to_string()));
    }

    /// Result of the next `reconnect` call; unscripted calls succeed
    pub fn push_reconnect_result(&mut self, result: Result<(), String>) {
        self.reconnect_results.push_back(result);
    }

    /// Stop acknowledging QoS 1/2 publishes
    pub fn withhold_acks(&mut self) {
        self.acknowledge_publishes = false;
    }

    pub fn reject_subscription(&mut self, filter: &str) {
        self.rejected_filters.insert(filter.to_string());
    }

    pub fn published(&self) -> &[PublishedMessage] {
        &self.published
    }

    /// Publishes to `topic`, in order
    pub fn published_to(&self, topic: &str) -> Vec<&PublishedMessage> {
        self.published.iter().filter(|m| m.topic == topic).collect()
    }

    pub fn subscriptions(&self) -> &[(String, QoS)] {
        &self.subscriptions
    }

    pub fn connect_calls(&self) -> u32 {
        self.connect_calls
    }

    pub fn reconnect_calls(&self) -> u32 {
        self.reconnect_calls
    }

    pub fn queued_events(&self) -> usize {
        self.events.len()
    }

    fn allocate_packet_id(&mut self) -> u16 {
        let packet_id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.wrapping_add(1).max(1);
        packet_id
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.connect_calls += 1;
        match &self.connect_failure {
            Some(reason) => Err(TransportError::ConnectionFailed(reason.clone())),
            None => Ok(()),
        }
    }

    async fn reconnect(&mut self) -> Result<(), TransportError> {
        self.reconnect_calls += 1;
        match self.reconnect_results.pop_front() {
            Some(Err(reason)) => Err(TransportError::ConnectionFailed(reason)),
            Some(Ok(())) | None => Ok(()),
        }
    }

    fn set_auto_reconnect(&mut self, enabled: bool) {
        self.auto_reconnect = enabled;
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
        self.published.push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            qos,
            retain,
        });

        if qos.expects_ack() {
            let packet_id = self.allocate_packet_id();
            self.events.push_back(TransportEvent::PublishSent(packet_id));
            if self.acknowledge_publishes {
                self.events
                    .push_back(TransportEvent::PublishAcknowledged(packet_id));
            }
        }
        Ok(())
    }

    async fn subscribe(&mut self, filter: &str, qos: QoS) -> Result<(), TransportError> {
        self.subscriptions.push((filter.to_string(), qos));

        let packet_id = self.allocate_packet_id();
        let rejected = self.rejected_filters.contains(filter);
        self.events.push_back(TransportEvent::SubscribeSent(packet_id));
        self.events
            .push_back(TransportEvent::SubscribeAcknowledged { packet_id, rejected });
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<TransportEvent>, TransportError> {
        match self.events.pop_front() {
            Some(event) => Ok(Some(event)),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
        }
    }

    fn topic_matches(&self, filter: &str, topic: &str) -> bool {
        rumqttc::mqttbytes::matches(topic, filter)
    }
}

/// Observer that records everything it is told
#[derive(Debug, Default)]
pub struct RecordingObserver {
    transitions: Mutex<Vec<(ConnectionState, ConnectionState)>>,
    disconnects: Mutex<Vec<DisconnectEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transitions(&self) -> Vec<(ConnectionState, ConnectionState)> {
        self.transitions
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    /// Target state of every recorded transition
    pub fn states(&self) -> Vec<ConnectionState> {
        self.transitions().into_iter().map(|(_, to)| to).collect()
    }

    pub fn disconnects(&self) -> Vec<DisconnectEvent> {
        self.disconnects
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

impl ConnectionObserver for RecordingObserver {
    fn on_transition(&self, from: ConnectionState, to: ConnectionState) {
        if let Ok(mut transitions) = self.transitions.lock() {
            transitions.push((from, to));
        }
    }

    fn on_disconnect(&self, event: &DisconnectEvent) {
        if let Ok(mut disconnects) = self.disconnects.lock() {
            disconnects.push(event.clone());
        }
    }
}

/// Handler that records every message delivered to it
#[derive(Debug, Default)]
pub struct RecordingHandler {
    messages: Mutex<Vec<InboundMessage>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<InboundMessage> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn payloads(&self) -> Vec<String> {
        self.messages()
            .iter()
            .map(|m| m.payload_text().into_owned())
            .collect()
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, message: &InboundMessage, _publisher: &mut dyn Publisher) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.clone());
        }
    }
}
