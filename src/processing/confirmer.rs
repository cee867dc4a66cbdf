//! Command confirmation handler
//!
//! Runs for every message delivered on a subscribed topic:
//! 1. Log the topic and payload
//! 2. Decode the JSON envelope
//! 3. Ask the confirmation policy whether a confirmation is due
//! 4. Encode the confirmation within the size bound
//! 5. Publish it at QoS 1 to the confirmation topic

use crate::observability::metrics::metrics;
use crate::protocol::{codec, policy, CodecError, ConfirmationEnvelope, QoS, Topic};
use crate::transport::{Ack, InboundMessage, MessageHandler, PublishError, Publisher};
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What happened to one inbound message
#[derive(Debug)]
pub enum ConfirmOutcome {
    Confirmed { message_id: i64, ack: Ack },
    NotACommand,
    Malformed(CodecError),
    EncodeFailed(CodecError),
    PublishFailed(PublishError),
}

/// Decodes commands and publishes their confirmations
#[derive(Debug, Clone)]
pub struct CommandConfirmer {
    confirm_topic: Topic,
    max_payload_bytes: usize,
}

impl CommandConfirmer {
    pub fn new(confirm_topic: Topic, max_payload_bytes: usize) -> Self {
        Self {
            confirm_topic,
            max_payload_bytes,
        }
    }

    pub fn confirm_topic(&self) -> &Topic {
        &self.confirm_topic
    }

    /// Steps 2-4: payload to encoded confirmation, if one is due
    pub fn prepare(&self, payload: &[u8]) -> Result<Option<(i64, Vec<u8>)>, ConfirmOutcome> {
        let envelope = codec::decode(payload).map_err(ConfirmOutcome::Malformed)?;

        let Some(confirmation) = policy::evaluate(&envelope) else {
            debug!(
                message_type = ?envelope.message_type,
                message_id = ?envelope.message_id,
                "Message is not a confirmable command"
            );
            return Ok(None);
        };

        let bytes = Self::encode_step(&confirmation, self.max_payload_bytes)?;
        Ok(Some((confirmation.message_id, bytes)))
    }

    fn encode_step(
        confirmation: &ConfirmationEnvelope,
        limit: usize,
    ) -> Result<Vec<u8>, ConfirmOutcome> {
        codec::encode(confirmation, limit).map_err(ConfirmOutcome::EncodeFailed)
    }

    /// Run every step against `message`, publishing through `publisher`
    pub async fn confirm(
        &self,
        message: &InboundMessage,
        publisher: &mut dyn Publisher,
    ) -> ConfirmOutcome {
        let (message_id, payload) = match self.prepare(&message.payload) {
            Ok(Some(prepared)) => prepared,
            Ok(None) => return ConfirmOutcome::NotACommand,
            Err(outcome) => return outcome,
        };

        match publisher
            .publish(&self.confirm_topic, payload, QoS::AtLeastOnce)
            .await
        {
            Ok(ack) => ConfirmOutcome::Confirmed { message_id, ack },
            Err(e) => ConfirmOutcome::PublishFailed(e),
        }
    }

    /// Log and count an outcome; nothing here is fatal
    fn report(&self, message: &InboundMessage, outcome: &ConfirmOutcome, started: Instant) {
        let collector = metrics();
        match outcome {
            ConfirmOutcome::Confirmed { message_id, ack } => {
                collector.command_confirmed(started.elapsed());
                info!(
                    message_id,
                    packet_id = ?ack.packet_id,
                    "Published confirmation to {}",
                    self.confirm_topic
                );
            }
            ConfirmOutcome::NotACommand => collector.command_ignored(),
            ConfirmOutcome::Malformed(e) => {
                collector.payload_malformed();
                warn!("Dropping message on {}: {}", message.topic, e);
            }
            ConfirmOutcome::EncodeFailed(e) => {
                collector.confirmation_encode_failed();
                error!("Failed to encode confirmation: {}", e);
            }
            ConfirmOutcome::PublishFailed(PublishError::RequestTimeout) => {
                warn!("Confirmation publish timed out; not retrying");
            }
            ConfirmOutcome::PublishFailed(e) => {
                error!("Failed to publish confirmation: {}", e);
            }
        }
    }
}

#[async_trait]
impl MessageHandler for CommandConfirmer {
    async fn handle(&self, message: &InboundMessage, publisher: &mut dyn Publisher) {
        info!(
            topic = %message.topic,
            payload = %message.payload_text(),
            "Message received"
        );

        let started = Instant::now();
        let outcome = self.confirm(message, publisher).await;
        self.report(message, &outcome, started);
    }
}
