//! Core configuration types and loading.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::defaults::*;
use crate::net::{ReconnectPolicy, TcpSettings};
use crate::session::SessionSettings;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub account: AccountConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn session_settings(&self) -> SessionSettings {
        let mut settings = SessionSettings::new(
            self.connection.domain.clone(),
            self.account.username.clone(),
            self.account.password.clone(),
        );
        settings.resource = self.connection.resource.clone();
        settings.create_account = self.account.create_if_missing;
        settings.request_timeout = Duration::from_millis(self.connection.request_timeout_ms);
        settings.discovery_timeout = Duration::from_millis(self.connection.discovery_timeout_ms);
        settings
    }

    pub fn tcp_settings(&self) -> TcpSettings {
        let reconnect = &self.connection.reconnect;
        TcpSettings {
            host: self.connection.host.clone(),
            port: self.connection.port,
            secure: self.connection.secure,
            accept_self_signed: self.connection.accept_self_signed,
            max_frame: spacelink_proto::codec::DEFAULT_MAX_FRAME,
            reconnect: ReconnectPolicy {
                enabled: reconnect.enabled,
                initial_delay: Duration::from_secs(reconnect.initial_delay_secs),
                max_delay: Duration::from_secs(reconnect.max_delay_secs),
                max_attempts: reconnect.max_attempts,
            },
        }
    }
}

/// Where and how to connect.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Host to open the TCP connection to.
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Domain of the network; login and discovery are addressed to it.
    pub domain: String,
    /// Resource bound at login, identifying this application.
    #[serde(default = "default_resource")]
    pub resource: String,
    #[serde(default)]
    pub secure: bool,
    /// Skip certificate verification. Only for test servers.
    #[serde(default)]
    pub accept_self_signed: bool,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_discovery_timeout_ms")]
    pub discovery_timeout_ms: u64,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

/// Reconnection with exponential backoff.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_secs: default_initial_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Account credentials. Wiped from memory on drop.
#[derive(Clone, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct AccountConfig {
    pub username: String,
    pub password: String,
    /// Register the account during connect if the server does not know it.
    #[serde(default)]
    pub create_if_missing: bool,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("create_if_missing", &self.create_if_missing)
            .finish()
    }
}

/// Local store location.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// SQLite file, or `:memory:`.
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
