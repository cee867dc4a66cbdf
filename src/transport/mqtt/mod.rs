//! rumqttc-backed implementation of [`crate::transport::Transport`]
//!
//! # Architecture
//!
//! - [`connection`] - Pure option building and backoff calculation
//! - [`event_router`] - Pure mapping of rumqttc events to transport events
//! - [`client`] - Impure I/O against the rumqttc event loop
//!
//! # Usage
//!
//! ```rust,no_run
//! use cmdconfirm::config::ClientConfig;
//! use cmdconfirm::transport::{mqtt::MqttTransport, Transport};
//!
//! # tokio_test_block_on(async {
//! let config = ClientConfig::for_broker("mqtt://localhost:1883");
//! let mut transport = MqttTransport::new(&config)?;
//! transport.connect().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod event_router;

pub use client::MqttTransport;
pub use connection::{configure_mqtt_options, ReconnectConfig};
pub use event_router::EventRouter;
