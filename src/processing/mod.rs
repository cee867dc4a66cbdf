//! Inbound message processing
//!
//! The only handler the session registers is [`CommandConfirmer`], which
//! turns command envelopes into confirmations.

pub mod confirmer;

pub use confirmer::{CommandConfirmer, ConfirmOutcome};
