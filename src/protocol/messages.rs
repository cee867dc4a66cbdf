//! Message types for the command/confirmation protocol
//!
//! Inbound messages carry a loosely structured JSON envelope; outbound
//! confirmations are a fixed two-key object published to the
//! acknowledgment topic.

use serde::{Deserialize, Serialize};

/// `message_type` value that marks an inbound envelope as a command
pub const COMMAND_MESSAGE_TYPE: &str = "COMMAND";

/// `message_type` value carried by every confirmation
pub const CONFIRMATION_MESSAGE_TYPE: &str = "CONFIRMATION";

/// Topic confirmations and the startup handshake are published to
pub const CONFIRM_TOPIC: &str = "command/confirm";

/// Liveness payload published once after connecting
pub const HANDSHAKE_PAYLOAD: &str = r#"{"hello":"world"}"#;

/// Historical upper bound for an encoded confirmation
pub const MAX_CONFIRMATION_BYTES: usize = 256;

/// Decoded inbound message envelope
///
/// Every field is optional: a payload that omits a key is still a valid
/// envelope. Strings are owned so the envelope never borrows from the
/// transport's receive buffer.
///
/// # Examples
/// ```
/// use cmdconfirm::protocol::Envelope;
///
/// let envelope = Envelope {
///     message: Some("reboot".to_string()),
///     message_id: Some(7),
///     message_type: Some("COMMAND".to_string()),
/// };
/// assert!(envelope.is_command());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Free-form message text
    pub message: Option<String>,
    /// Sender-assigned identifier echoed back in the confirmation
    pub message_id: Option<i64>,
    /// Message classification, compared case-sensitively
    pub message_type: Option<String>,
}

impl Envelope {
    /// True when `message_type` is exactly `"COMMAND"`
    pub fn is_command(&self) -> bool {
        self.message_type.as_deref() == Some(COMMAND_MESSAGE_TYPE)
    }
}

/// Outbound confirmation for a command
///
/// The wire form always carries `"message_type":"CONFIRMATION"`; only the
/// echoed identifier varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationEnvelope {
    pub message_id: i64,
}

impl ConfirmationEnvelope {
    pub fn new(message_id: i64) -> Self {
        Self { message_id }
    }

    pub fn message_type(&self) -> &'static str {
        CONFIRMATION_MESSAGE_TYPE
    }
}

/// Delivery guarantee for a publish or subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl QoS {
    /// Whether a publish at this level is acknowledged by the broker
    pub fn expects_ack(self) -> bool {
        !matches!(self, QoS::AtMostOnce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_command_is_case_sensitive() {
        let mut envelope = Envelope {
            message_type: Some("COMMAND".to_string()),
            ..Default::default()
        };
        assert!(envelope.is_command());

        envelope.message_type = Some("command".to_string());
        assert!(!envelope.is_command());

        envelope.message_type = Some("COMMAND ".to_string());
        assert!(!envelope.is_command());

        envelope.message_type = None;
        assert!(!envelope.is_command());
    }

    #[test]
    fn test_confirmation_message_type_is_constant() {
        let confirmation = ConfirmationEnvelope::new(42);
        assert_eq!(confirmation.message_type(), "CONFIRMATION");
        assert_eq!(confirmation.message_id, 42);
    }

    #[test]
    fn test_qos_expects_ack() {
        assert!(!QoS::AtMostOnce.expects_ack());
        assert!(QoS::AtLeastOnce.expects_ack());
        assert!(QoS::ExactlyOnce.expects_ack());
    }
}
