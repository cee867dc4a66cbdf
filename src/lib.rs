//! cmdconfirm - MQTT command/confirmation client
//!
//! Connects to a broker, subscribes to operator-supplied topics and answers
//! every `COMMAND` message with a `CONFIRMATION` published to
//! `command/confirm`.
//!
//! # Overview
//!
//! - [`protocol`] - Envelopes, topic validation, JSON codec and confirmation policy
//! - [`transport`] - Publish/subscribe gateway, reconnection supervisor and the rumqttc transport
//! - [`processing`] - The command confirmation handler
//! - [`session`] - Startup sequence and the steady-state loop
//!
//! # Quick Start
//!
//! ```rust
//! use cmdconfirm::protocol::{codec, policy};
//!
//! let envelope = codec::decode(br#"{"message":"hi","message_id":5,"message_type":"COMMAND"}"#).unwrap();
//! let confirmation = policy::evaluate(&envelope).unwrap();
//! let bytes = codec::encode(&confirmation, 256).unwrap();
//!
//! assert_eq!(bytes, br#"{"message_type":"CONFIRMATION","message_id":5}"#);
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod processing;
pub mod protocol;
pub mod session;
pub mod testing;
pub mod transport;

pub use config::*;
pub use error::{SessionError, SessionResult};
pub use processing::CommandConfirmer;
pub use protocol::*;
pub use session::Session;
pub use transport::mqtt::MqttTransport;
