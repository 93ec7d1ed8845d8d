//! Configuration loading and management.
//!
//! - [`types`]: config structs and loading
//! - [`defaults`]: serde default functions
//! - [`validation`]: startup checks

mod defaults;
mod types;
mod validation;

pub use types::{
    AccountConfig, Config, ConfigError, ConnectionConfig, LogFormat, LoggingConfig,
    ReconnectConfig, StoreConfig,
};
pub use validation::{ValidationError, validate};
