//! Confirmation policy: which envelopes get a confirmation

use super::messages::{ConfirmationEnvelope, Envelope};

/// Decide whether `envelope` must be confirmed
///
/// A confirmation is produced only for a `"COMMAND"` envelope carrying a
/// non-negative `message_id`. Anything else, including unknown message
/// types, is simply not a command.
///
/// # Examples
/// ```
/// use cmdconfirm::protocol::{policy::evaluate, Envelope};
///
/// let command = Envelope {
///     message: None,
///     message_id: Some(5),
///     message_type: Some("COMMAND".to_string()),
/// };
/// assert_eq!(evaluate(&command).map(|c| c.message_id), Some(5));
/// assert!(evaluate(&Envelope::default()).is_none());
/// ```
pub fn evaluate(envelope: &Envelope) -> Option<ConfirmationEnvelope> {
    if !envelope.is_command() {
        return None;
    }
    envelope
        .message_id
        .filter(|id| *id >= 0)
        .map(ConfirmationEnvelope::new)
}
