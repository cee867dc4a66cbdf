//! Startup errors
//!
//! Everything after startup is logged and absorbed by the session loop, so
//! these are the only errors that end the process.

use crate::config::ConfigError;
use crate::transport::TransportError;
use thiserror::Error;

/// Fatal session errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to set up transport: {0}")]
    Transport(#[source] TransportError),

    #[error("Failed to connect to broker: {0}")]
    Connect(#[source] TransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Operator input closed before any topic was subscribed")]
    InputClosed,

    #[error("Failed to read operator input: {0}")]
    Input(#[from] std::io::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;
