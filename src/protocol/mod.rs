//! Command/confirmation protocol
//!
//! Message types, topic validation, the JSON codec and the confirmation
//! policy. Everything here is pure; I/O lives in [`crate::transport`].

pub mod codec;
pub mod messages;
pub mod policy;
pub mod topics;

pub use codec::CodecError;
pub use messages::*;
pub use topics::*;
