//! Configuration loading and validation.
//!
//! The configuration is an immutable structure constructed once at
//! startup and passed by handle into each component. Validation
//! failures are fatal at startup and never occur during the run loop.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("unknown plugin: {0}")]
    UnknownPlugin(String),
}

/// Bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server connection settings.
    pub connection: ConnectionConfig,
    /// SASL authentication settings.
    #[serde(default)]
    pub sasl: SaslConfig,
    /// Database settings.
    pub database: DatabaseConfig,
    /// Read and keepalive timing.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    /// Reconnection backoff.
    #[serde(default)]
    pub backoff: BackoffConfig,
    /// Plugin selection.
    #[serde(default)]
    pub plugins: PluginsConfig,
    /// Version string reported via CTCP VERSION and the version command.
    #[serde(default = "default_version")]
    pub version: String,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field requirements serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("connection.hostname", &self.connection.hostname),
            ("connection.nick", &self.connection.nick),
            ("connection.ident", &self.connection.ident),
            ("connection.realname", &self.connection.realname),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} must not be empty", field)));
            }
        }

        if self.connection.command_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "connection.command_prefix must not be empty".into(),
            ));
        }

        if self.sasl.enabled && (self.sasl.username.is_empty() || self.sasl.password.is_empty()) {
            return Err(ConfigError::Invalid(
                "sasl.username and sasl.password are required when sasl.enabled is set".into(),
            ));
        }

        if self.timeouts.read == 0 || self.timeouts.keepalive == 0 {
            return Err(ConfigError::Invalid(
                "timeouts.read and timeouts.keepalive must be at least 1 second".into(),
            ));
        }

        Ok(())
    }
}

/// Server connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Server hostname.
    pub hostname: String,
    /// Server port; a leading `+` on a string value selects TLS.
    pub port: Port,
    /// Nickname to register with.
    pub nick: String,
    /// Ident / username for the USER command.
    pub ident: String,
    /// Real name for the USER command.
    pub realname: String,
    /// Marker that introduces a bot command inside chat messages.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
}

/// A server port, with TLS selected by a leading `+` marker on the
/// configured value (e.g. `"+6697"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Port {
    /// TCP port number.
    pub number: u16,
    /// Whether the connection is upgraded to TLS.
    pub tls: bool,
}

impl<'de> Deserialize<'de> for Port {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PortVisitor;

        impl Visitor<'_> for PortVisitor {
            type Value = Port;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a port number, optionally prefixed with '+' for TLS")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Port, E> {
                let number = u16::try_from(value)
                    .map_err(|_| E::custom(format!("port {} out of range", value)))?;
                Ok(Port { number, tls: false })
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Port, E> {
                let number = u16::try_from(value)
                    .map_err(|_| E::custom(format!("port {} out of range", value)))?;
                Ok(Port { number, tls: false })
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Port, E> {
                let (digits, tls) = match value.strip_prefix('+') {
                    Some(rest) => (rest, true),
                    None => (value, false),
                };
                let number = digits
                    .parse::<u16>()
                    .map_err(|_| E::custom(format!("invalid port value {:?}", value)))?;
                Ok(Port { number, tls })
            }
        }

        deserializer.deserialize_any(PortVisitor)
    }
}

/// SASL authentication settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaslConfig {
    /// Opt into SASL PLAIN authentication.
    #[serde(default)]
    pub enabled: bool,
    /// Account name.
    #[serde(default)]
    pub username: String,
    /// Account password.
    #[serde(default)]
    pub password: String,
}

/// Database settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file (`:memory:` for tests).
    pub path: String,
}

/// Read and keepalive timing.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    /// Seconds without any read before the connection counts as dead
    /// (default: 300).
    #[serde(default = "default_read_timeout")]
    pub read: u64,
    /// Seconds between keepalive PINGs (default: 60).
    #[serde(default = "default_keepalive_interval")]
    pub keepalive: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            read: default_read_timeout(),
            keepalive: default_keepalive_interval(),
        }
    }
}

impl TimeoutsConfig {
    /// Read timeout as a [`Duration`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read)
    }

    /// Keepalive interval as a [`Duration`].
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive)
    }
}

/// Reconnection backoff settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BackoffConfig {
    /// Initial delay in seconds (default: 30).
    #[serde(default = "default_backoff_initial")]
    pub initial: u64,
    /// Maximum delay in seconds (default: 300).
    #[serde(default = "default_backoff_max")]
    pub max: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: default_backoff_initial(),
            max: default_backoff_max(),
        }
    }
}

/// Plugin selection.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginsConfig {
    /// Plugin identifiers to load, in dispatch order.
    #[serde(default = "default_plugins")]
    pub enabled: Vec<String>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            enabled: default_plugins(),
        }
    }
}

fn default_command_prefix() -> String {
    "&".to_string()
}

fn default_read_timeout() -> u64 {
    300
}

fn default_keepalive_interval() -> u64 {
    60
}

fn default_backoff_initial() -> u64 {
    30
}

fn default_backoff_max() -> u64 {
    300
}

fn default_plugins() -> Vec<String> {
    vec!["hello".to_string(), "cookie".to_string()]
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
