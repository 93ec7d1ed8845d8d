//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use std::path::Path;

use thiserror::Error;

use super::Config;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("connection.host is required")]
    MissingHost,
    #[error("connection.domain is required")]
    MissingDomain,
    #[error("account.username is required")]
    MissingUsername,
    #[error("connection.{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("connection.reconnect.max_delay_secs ({max}) is below initial_delay_secs ({initial})")]
    ReconnectDelayInverted { initial: u64, max: u64 },
    #[error("store.path parent directory does not exist: {0}")]
    StorePathInvalid(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let connection = &config.connection;

    if connection.host.trim().is_empty() {
        errors.push(ValidationError::MissingHost);
    }
    if connection.domain.trim().is_empty() {
        errors.push(ValidationError::MissingDomain);
    }
    if config.account.username.trim().is_empty() {
        errors.push(ValidationError::MissingUsername);
    }

    if connection.request_timeout_ms == 0 {
        errors.push(ValidationError::ZeroTimeout("request_timeout_ms"));
    }
    if connection.discovery_timeout_ms == 0 {
        errors.push(ValidationError::ZeroTimeout("discovery_timeout_ms"));
    }

    let reconnect = &connection.reconnect;
    if reconnect.enabled && reconnect.max_delay_secs < reconnect.initial_delay_secs {
        errors.push(ValidationError::ReconnectDelayInverted {
            initial: reconnect.initial_delay_secs,
            max: reconnect.max_delay_secs,
        });
    }

    if config.store.path != ":memory:" {
        let path = Path::new(&config.store.path);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            errors.push(ValidationError::StorePathInvalid(config.store.path.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

impl Config {
    /// Validate this configuration. See [`validate`].
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        validate(self)
    }
}
