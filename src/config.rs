//! Configuration module for loading and parsing TOML configuration files.
//!
//! Every section is optional. Values can be overridden from the environment
//! with `IB_HOST`, `IB_PORT`, `IB_CLIENT_ID`, `IB_READONLY`, `HOST` and `PORT`.

use crate::broker::ConnectParams;
use crate::session::{
    HeartbeatConfig, ReconnectConfig, RequestTimeouts, SessionConfig,
};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG";

/// Configuration file used when `GATEWAY_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse TOML configuration.
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    /// Invalid configuration value.
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener.
    pub server: ServerConfig,
    /// Platform connection.
    pub broker: BrokerConfig,
    /// Request deadlines.
    pub requests: RequestsConfig,
    /// Liveness probe.
    pub heartbeat: HeartbeatSection,
    /// Reconnect backoff.
    pub reconnect: ReconnectSection,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port number to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Platform connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// Must be unique among the platform's connected clients.
    pub client_id: i32,
    /// Refuse order placement and cancellation.
    pub read_only: bool,
    pub connect_timeout_ms: u64,
    /// Connect while the server starts.
    pub connect_on_startup: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4002,
            client_id: 1,
            read_only: false,
            connect_timeout_ms: 5000,
            connect_on_startup: true,
        }
    }
}

/// Request deadlines in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RequestsConfig {
    pub default_timeout_ms: u64,
    pub historical_timeout_ms: u64,
    pub order_ack_timeout_ms: u64,
}

impl Default for RequestsConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 10_000,
            historical_timeout_ms: 60_000,
            order_ack_timeout_ms: 10_000,
        }
    }
}

/// Heartbeat settings. An interval of 0 disables the probe.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeartbeatSection {
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for HeartbeatSection {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            timeout_ms: 5_000,
        }
    }
}

/// Reconnect backoff settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectSection {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    /// Returns error if content cannot be parsed or is invalid.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the file named by `GATEWAY_CONFIG` (or `config.toml`), falling
    /// back to defaults when it does not exist, then applies environment
    /// overrides.
    ///
    /// # Errors
    /// Returns error if an existing file is unreadable or any value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = if Path::new(&path).exists() {
            info!("Loading configuration from {}", path);
            Self::load(&path)?
        } else {
            info!("No configuration file at {}, using defaults", path);
            Self::default()
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides looked up by variable name.
    ///
    /// # Errors
    /// Returns `InvalidValue` for an override that does not parse.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("IB_HOST") {
            self.broker.host = host;
        }
        if let Some(port) = lookup("IB_PORT") {
            self.broker.port = parse_var("IB_PORT", &port)?;
        }
        if let Some(client_id) = lookup("IB_CLIENT_ID") {
            self.broker.client_id = parse_var("IB_CLIENT_ID", &client_id)?;
        }
        if let Some(read_only) = lookup("IB_READONLY") {
            self.broker.read_only = parse_flag("IB_READONLY", &read_only)?;
        }
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = parse_var("PORT", &port)?;
        }
        Ok(())
    }

    /// Validates the configuration values.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue(
                "server port must be positive".to_string(),
            ));
        }
        if self.broker.host.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "broker host cannot be empty".to_string(),
            ));
        }
        if self.broker.port == 0 {
            return Err(ConfigError::InvalidValue(
                "broker port must be positive".to_string(),
            ));
        }
        if self.broker.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "broker connect_timeout_ms must be positive".to_string(),
            ));
        }
        let requests = &self.requests;
        if requests.default_timeout_ms == 0
            || requests.historical_timeout_ms == 0
            || requests.order_ack_timeout_ms == 0
        {
            return Err(ConfigError::InvalidValue(
                "request timeouts must be positive".to_string(),
            ));
        }
        if self.heartbeat.interval_ms > 0 && self.heartbeat.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "heartbeat timeout_ms must be positive".to_string(),
            ));
        }
        if self.reconnect.multiplier < 1.0 {
            return Err(ConfigError::InvalidValue(
                "reconnect multiplier must be at least 1.0".to_string(),
            ));
        }
        if self.reconnect.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "reconnect max_attempts must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Session settings derived from this configuration.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        let heartbeat = (self.heartbeat.interval_ms > 0).then(|| HeartbeatConfig {
            interval: Duration::from_millis(self.heartbeat.interval_ms),
            timeout: Duration::from_millis(self.heartbeat.timeout_ms),
        });
        SessionConfig {
            params: ConnectParams {
                host: self.broker.host.clone(),
                port: self.broker.port,
                client_id: self.broker.client_id,
                read_only: self.broker.read_only,
            },
            connect_timeout: Duration::from_millis(self.broker.connect_timeout_ms),
            timeouts: RequestTimeouts {
                default: Duration::from_millis(self.requests.default_timeout_ms),
                historical: Duration::from_millis(self.requests.historical_timeout_ms),
                order_ack: Duration::from_millis(self.requests.order_ack_timeout_ms),
            },
            heartbeat,
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(self.reconnect.initial_delay_ms),
                max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
                multiplier: self.reconnect.multiplier,
                max_attempts: self.reconnect.max_attempts,
            },
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("{} has invalid value {:?}", name, value)))
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue(format!(
            "{} has invalid value {:?}",
            name, value
        ))),
    }
}
