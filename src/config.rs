//! Configuration for the command consumer
//!
//! A single TOML file describes the broker, its TLS material, the
//! reconnection backoff bounds and the session behaviour. The file is loaded
//! once at startup into an immutable [`ClientConfig`] that is handed to the
//! components that need it.

use crate::protocol::{Topic, CONFIRM_TOPIC, HANDSHAKE_PAYLOAD, MAX_CONFIRMATION_BYTES};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Main client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    pub broker: BrokerSection,
    /// TLS material, required for `mqtts://` brokers
    pub tls: Option<TlsSection>,
    #[serde(default)]
    pub reconnect: ReconnectSection,
    #[serde(default)]
    pub session: SessionSection,
}

/// Broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Broker URL, `mqtt://host:port` or `mqtts://host:port`
    pub url: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_clean_session")]
    pub clean_session: bool,
    /// Upper bound for waiting on a PUBACK/SUBACK
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Upper bound for TCP connect plus TLS handshake plus CONNACK
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
}

/// Certificate locations, resolved against `certs_dir`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TlsSection {
    #[serde(default = "default_certs_dir")]
    pub certs_dir: PathBuf,
    pub root_ca: PathBuf,
    pub client_cert: Option<PathBuf>,
    pub private_key: Option<PathBuf>,
}

/// Exponential backoff bounds for automatic reconnection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectSection {
    #[serde(default = "default_min_wait_ms")]
    pub min_wait_ms: u64,
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            min_wait_ms: default_min_wait_ms(),
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

/// Session loop settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSection {
    #[serde(default = "default_confirm_topic")]
    pub confirm_topic: String,
    #[serde(default = "default_handshake_payload")]
    pub handshake_payload: String,
    /// How long a single pump waits for inbound traffic
    #[serde(default = "default_pump_timeout_ms")]
    pub pump_timeout_ms: u64,
    /// Pause between pumps
    #[serde(default = "default_idle_delay_ms")]
    pub idle_delay_ms: u64,
    #[serde(default = "default_max_confirmation_bytes")]
    pub max_confirmation_bytes: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            confirm_topic: default_confirm_topic(),
            handshake_payload: default_handshake_payload(),
            pump_timeout_ms: default_pump_timeout_ms(),
            idle_delay_ms: default_idle_delay_ms(),
            max_confirmation_bytes: default_max_confirmation_bytes(),
        }
    }
}

fn default_client_id() -> String {
    "command-consumer".to_string()
}

fn default_keep_alive_secs() -> u64 {
    600
}

fn default_clean_session() -> bool {
    true
}

fn default_command_timeout_ms() -> u64 {
    20_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_certs_dir() -> PathBuf {
    PathBuf::from("certs")
}

fn default_min_wait_ms() -> u64 {
    1_000
}

fn default_max_wait_ms() -> u64 {
    128_000
}

fn default_confirm_topic() -> String {
    CONFIRM_TOPIC.to_string()
}

fn default_handshake_payload() -> String {
    HANDSHAKE_PAYLOAD.to_string()
}

fn default_pump_timeout_ms() -> u64 {
    100
}

fn default_idle_delay_ms() -> u64 {
    1_000
}

fn default_max_confirmation_bytes() -> usize {
    MAX_CONFIRMATION_BYTES
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration for a plain-TCP broker with every other value defaulted
    pub fn for_broker(url: &str) -> Self {
        Self {
            broker: BrokerSection {
                url: url.to_string(),
                client_id: default_client_id(),
                keep_alive_secs: default_keep_alive_secs(),
                clean_session: default_clean_session(),
                command_timeout_ms: default_command_timeout_ms(),
                connect_timeout_ms: default_connect_timeout_ms(),
                username_env: None,
                password_env: None,
            },
            tls: None,
            reconnect: ReconnectSection::default(),
            session: SessionSection::default(),
        }
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.broker_url()?;
        if url.scheme() == "mqtts" && self.tls.is_none() {
            return Err(ConfigError::InvalidConfig(
                "mqtts:// brokers require a [tls] section".to_string(),
            ));
        }

        if let Some(tls) = &self.tls {
            if tls.client_cert.is_some() != tls.private_key.is_some() {
                return Err(ConfigError::InvalidConfig(
                    "client_cert and private_key must be given together".to_string(),
                ));
            }
        }

        if self.broker.client_id.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "broker.client_id cannot be empty".to_string(),
            ));
        }
        if self.broker.keep_alive_secs < 5 {
            return Err(ConfigError::InvalidConfig(
                "broker.keep_alive_secs must be at least 5".to_string(),
            ));
        }

        let reconnect = &self.reconnect;
        if reconnect.min_wait_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "reconnect.min_wait_ms must be greater than 0".to_string(),
            ));
        }
        if reconnect.min_wait_ms > reconnect.max_wait_ms {
            return Err(ConfigError::InvalidConfig(format!(
                "reconnect.min_wait_ms ({}) exceeds reconnect.max_wait_ms ({})",
                reconnect.min_wait_ms, reconnect.max_wait_ms
            )));
        }

        if self.session.pump_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "session.pump_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.session.max_confirmation_bytes == 0 {
            return Err(ConfigError::InvalidConfig(
                "session.max_confirmation_bytes must be greater than 0".to_string(),
            ));
        }
        self.confirm_topic()?;

        Ok(())
    }

    /// Parsed broker URL; only `mqtt` and `mqtts` schemes are accepted
    pub fn broker_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.broker.url).map_err(|e| {
            ConfigError::InvalidConfig(format!("invalid broker url '{}': {e}", self.broker.url))
        })?;
        match url.scheme() {
            "mqtt" | "mqtts" if url.host_str().is_some() => Ok(url),
            "mqtt" | "mqtts" => Err(ConfigError::InvalidConfig(format!(
                "broker url '{}' has no host",
                self.broker.url
            ))),
            other => Err(ConfigError::InvalidConfig(format!(
                "unsupported broker url scheme '{other}', expected mqtt or mqtts"
            ))),
        }
    }

    pub fn confirm_topic(&self) -> Result<Topic, ConfigError> {
        Topic::parse(&self.session.confirm_topic)
            .map_err(|e| ConfigError::InvalidConfig(format!("session.confirm_topic: {e}")))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.broker.command_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.broker.connect_timeout_ms)
    }

    pub fn pump_timeout(&self) -> Duration {
        Duration::from_millis(self.session.pump_timeout_ms)
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.session.idle_delay_ms)
    }

    /// Get MQTT username from environment variable
    pub fn get_mqtt_username(&self) -> Option<String> {
        Self::get_env_var_optional(self.broker.username_env.as_ref())
    }

    /// Get MQTT password from environment variable
    pub fn get_mqtt_password(&self) -> Option<String> {
        Self::get_env_var_optional(self.broker.password_env.as_ref())
    }

    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }
}

impl TlsSection {
    /// Resolve certificate paths against `base` (normally the working directory)
    pub fn resolve(&self, base: &Path) -> TlsPaths {
        let dir = base.join(&self.certs_dir);
        TlsPaths {
            root_ca: dir.join(&self.root_ca),
            client_cert: self.client_cert.as_ref().map(|p| dir.join(p)),
            private_key: self.private_key.as_ref().map(|p| dir.join(p)),
        }
    }
}

/// Absolute certificate locations
#[derive(Debug, Clone, PartialEq)]
pub struct TlsPaths {
    pub root_ca: PathBuf,
    pub client_cert: Option<PathBuf>,
    pub private_key: Option<PathBuf>,
}
