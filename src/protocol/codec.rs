//! JSON codec for inbound envelopes and outbound confirmations

use super::messages::{ConfirmationEnvelope, Envelope, CONFIRMATION_MESSAGE_TYPE};
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::{self, Write};
use thiserror::Error;

/// Codec failures
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Encoded payload exceeds {limit} bytes (needed at least {size})")]
    PayloadTooLarge { size: usize, limit: usize },
}

/// Decode a raw payload into an envelope
///
/// The payload must be a JSON object. Known keys are extracted permissively:
/// a missing key, or one holding a value of the wrong JSON type, is treated
/// as absent. Unknown keys are ignored.
///
/// # Examples
/// ```
/// use cmdconfirm::protocol::codec::decode;
///
/// let envelope = decode(br#"{"message":"hi","message_id":5,"message_type":"COMMAND"}"#).unwrap();
/// assert_eq!(envelope.message_id, Some(5));
/// assert!(decode(b"not json").is_err());
/// ```
pub fn decode(payload: &[u8]) -> Result<Envelope, CodecError> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| CodecError::MalformedPayload(e.to_string()))?;

    let Value::Object(object) = value else {
        return Err(CodecError::MalformedPayload(format!(
            "expected a JSON object, got {}",
            json_kind(&value)
        )));
    };

    Ok(Envelope {
        message: string_field(&object, "message"),
        message_id: object.get("message_id").and_then(Value::as_i64),
        message_type: string_field(&object, "message_type"),
    })
}

/// Encode a confirmation as single-line JSON, refusing to exceed `limit` bytes
///
/// Output is never truncated: if the encoding does not fit, the call fails
/// with [`CodecError::PayloadTooLarge`].
pub fn encode(confirmation: &ConfirmationEnvelope, limit: usize) -> Result<Vec<u8>, CodecError> {
    let wire = ConfirmationWire {
        message_type: CONFIRMATION_MESSAGE_TYPE,
        message_id: confirmation.message_id,
    };

    let mut writer = BoundedWriter::new(limit);
    match serde_json::to_writer(&mut writer, &wire) {
        Ok(()) => Ok(writer.into_inner()),
        Err(_) if writer.overflowed => Err(CodecError::PayloadTooLarge {
            size: writer.attempted,
            limit,
        }),
        // Serializing two plain fields can only fail through the writer
        Err(e) => Err(CodecError::MalformedPayload(e.to_string())),
    }
}

#[derive(Serialize)]
struct ConfirmationWire<'a> {
    message_type: &'a str,
    message_id: i64,
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Writer over a fixed-capacity buffer that errors instead of growing
struct BoundedWriter {
    buf: Vec<u8>,
    limit: usize,
    attempted: usize,
    overflowed: bool,
}

impl BoundedWriter {
    fn new(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(limit),
            limit,
            attempted: 0,
            overflowed: false,
        }
    }

    fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl Write for BoundedWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.attempted += data.len();
        if self.buf.len() + data.len() > self.limit {
            self.overflowed = true;
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "confirmation buffer full",
            ));
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::MAX_CONFIRMATION_BYTES;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn confirmation_round_trips_message_id(message_id in 0i64..=i64::MAX) {
            let confirmation = ConfirmationEnvelope::new(message_id);
            let bytes = encode(&confirmation, MAX_CONFIRMATION_BYTES).unwrap();
            let decoded = decode(&bytes).unwrap();
            prop_assert_eq!(decoded.message_id, Some(message_id));
            prop_assert_eq!(decoded.message_type.as_deref(), Some("CONFIRMATION"));
        }
    }

    #[test]
    fn test_decode_full_envelope() {
        let envelope =
            decode(br#"{"message":"hi","message_id":5,"message_type":"COMMAND"}"#).unwrap();
        assert_eq!(envelope.message.as_deref(), Some("hi"));
        assert_eq!(envelope.message_id, Some(5));
        assert_eq!(envelope.message_type.as_deref(), Some("COMMAND"));
    }

    #[test]
    fn test_decode_missing_fields_are_absent() {
        let envelope = decode(b"{}").unwrap();
        assert_eq!(envelope, Envelope::default());

        let envelope = decode(br#"{"message_type":"INFO"}"#).unwrap();
        assert_eq!(envelope.message, None);
        assert_eq!(envelope.message_id, None);
        assert_eq!(envelope.message_type.as_deref(), Some("INFO"));
    }

    #[test]
    fn test_decode_ignores_unknown_and_mistyped_fields() {
        let envelope = decode(
            br#"{"message":42,"message_id":"5","message_type":"COMMAND","extra":{"nested":true}}"#,
        )
        .unwrap();
        assert_eq!(envelope.message, None);
        assert_eq!(envelope.message_id, None);
        assert_eq!(envelope.message_type.as_deref(), Some("COMMAND"));
    }

    #[test]
    fn test_decode_negative_id() {
        let envelope = decode(br#"{"message_id":-1,"message_type":"COMMAND"}"#).unwrap();
        assert_eq!(envelope.message_id, Some(-1));
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        assert!(matches!(
            decode(b"not json"),
            Err(CodecError::MalformedPayload(_))
        ));
        assert!(matches!(decode(b""), Err(CodecError::MalformedPayload(_))));
        assert!(matches!(
            decode(br#"{"message_id":5"#),
            Err(CodecError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_rejects_non_object_top_level() {
        for payload in [&b"[1,2,3]"[..], b"\"COMMAND\"", b"17", b"null", b"true"] {
            let result = decode(payload);
            assert!(
                matches!(result, Err(CodecError::MalformedPayload(_))),
                "payload {:?} should be rejected",
                String::from_utf8_lossy(payload)
            );
        }
    }

    #[test]
    fn test_encode_exact_wire_format() {
        let bytes = encode(&ConfirmationEnvelope::new(5), MAX_CONFIRMATION_BYTES).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"message_type":"CONFIRMATION","message_id":5}"#
        );
    }

    #[test]
    fn test_encode_fails_instead_of_truncating() {
        let result = encode(&ConfirmationEnvelope::new(123456789), 20);
        match result {
            Err(CodecError::PayloadTooLarge { size, limit }) => {
                assert_eq!(limit, 20);
                assert!(size > limit);
            }
            other => panic!("Expected PayloadTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn test_encode_fits_exactly_at_limit() {
        let expected = r#"{"message_type":"CONFIRMATION","message_id":5}"#;
        let bytes = encode(&ConfirmationEnvelope::new(5), expected.len()).unwrap();
        assert_eq!(bytes.len(), expected.len());

        assert!(encode(&ConfirmationEnvelope::new(5), expected.len() - 1).is_err());
    }
}
