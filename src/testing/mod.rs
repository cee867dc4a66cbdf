//! Testing utilities and mock implementations
//!
//! Mocks for driving the gateway and session without an MQTT broker.

pub mod mocks;

pub use mocks::*;
