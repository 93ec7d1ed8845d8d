//! Default value functions for configuration.

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// Connection Defaults
// =============================================================================

pub fn default_port() -> u16 {
    5222
}

pub fn default_resource() -> String {
    "spacelink".to_string()
}

pub fn default_request_timeout_ms() -> u64 {
    2000
}

pub fn default_discovery_timeout_ms() -> u64 {
    2000
}

// =============================================================================
// Reconnect Defaults
// =============================================================================

pub fn default_initial_delay_secs() -> u64 {
    1
}

pub fn default_max_delay_secs() -> u64 {
    60
}

pub fn default_max_attempts() -> u32 {
    10
}

// =============================================================================
// Store and Logging Defaults
// =============================================================================

pub fn default_store_path() -> String {
    "spacelink.db".to_string()
}

pub fn default_log_level() -> String {
    "info".to_string()
}
