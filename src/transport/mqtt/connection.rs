//! Pure connection configuration for the rumqttc client
//!
//! This module turns the loaded [`ClientConfig`] into rumqttc options and
//! computes the exponential backoff used by automatic reconnection.

use crate::config::{ClientConfig, ReconnectSection, TlsPaths};
use crate::protocol::QoS;
use crate::transport::TransportError;
use rumqttc::{MqttOptions, TlsConfiguration, Transport as RumqttcTransport};
use std::path::Path;
use std::time::Duration;

/// Default port for plain `mqtt://` brokers
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default port for `mqtts://` brokers
pub const DEFAULT_MQTTS_PORT: u16 = 8883;

/// Exponential backoff bounds for automatic reconnection
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::from(&ReconnectSection::default())
    }
}

impl From<&ReconnectSection> for ReconnectConfig {
    fn from(section: &ReconnectSection) -> Self {
        Self {
            min_wait: Duration::from_millis(section.min_wait_ms),
            max_wait: Duration::from_millis(section.max_wait_ms),
        }
    }
}

impl ReconnectConfig {
    /// Delay before reconnection attempt `attempt` (1-based)
    ///
    /// Doubles from `min_wait` and saturates at `max_wait`.
    pub fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.min_wait.saturating_mul(1u32 << exponent);
        delay.min(self.max_wait)
    }
}

/// Map our QoS onto the rumqttc one
pub fn to_mqtt_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

/// Build rumqttc options from the client configuration
///
/// Certificate paths are resolved against `base_dir` and read eagerly so a
/// missing file fails startup instead of the first connection attempt.
pub fn configure_mqtt_options(
    config: &ClientConfig,
    base_dir: &Path,
) -> Result<MqttOptions, TransportError> {
    let url = config
        .broker_url()
        .map_err(|e| TransportError::InvalidBrokerUrl(e.to_string()))?;

    let host = url
        .host_str()
        .ok_or_else(|| TransportError::InvalidBrokerUrl(config.broker.url.clone()))?;
    let secure = url.scheme() == "mqtts";
    let port = url.port().unwrap_or(if secure {
        DEFAULT_MQTTS_PORT
    } else {
        DEFAULT_MQTT_PORT
    });

    let mut mqtt_options = MqttOptions::new(config.broker.client_id.clone(), host, port);
    mqtt_options.set_keep_alive(Duration::from_secs(config.broker.keep_alive_secs));
    mqtt_options.set_clean_session(config.broker.clean_session);

    if let Some(username) = config.get_mqtt_username() {
        let password = config.get_mqtt_password().unwrap_or_default();
        mqtt_options.set_credentials(username, password);
    }

    if secure {
        let tls = config.tls.as_ref().ok_or_else(|| {
            TransportError::Tls("mqtts:// broker configured without [tls] section".to_string())
        })?;
        let tls_config = load_tls_configuration(&tls.resolve(base_dir))?;
        mqtt_options.set_transport(RumqttcTransport::tls_with_config(tls_config));
    }

    Ok(mqtt_options)
}

/// Read CA and optional client certificate/key into a rustls configuration
pub fn load_tls_configuration(paths: &TlsPaths) -> Result<TlsConfiguration, TransportError> {
    let ca = read_pem(&paths.root_ca)?;
    let client_auth = match (&paths.client_cert, &paths.private_key) {
        (Some(cert), Some(key)) => Some((read_pem(cert)?, read_pem(key)?)),
        (None, None) => None,
        _ => {
            return Err(TransportError::Tls(
                "client certificate and private key must be given together".to_string(),
            ))
        }
    };

    Ok(TlsConfiguration::Simple {
        ca,
        alpn: None,
        client_auth,
    })
}

fn read_pem(path: &Path) -> Result<Vec<u8>, TransportError> {
    std::fs::read(path)
        .map_err(|e| TransportError::Tls(format!("failed to read {}: {e}", path.display())))
}
