//! Service discovery results.

/// Name under which the spaces service announces itself.
pub const SPACES_SERVICE_NAME: &str = "MIRROR Spaces Service";

/// Name under which the persistence service announces itself.
pub const PERSISTENCE_SERVICE_NAME: &str = "MIRROR Persistence Service";

/// Services found on the domain after login.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkInfo {
    pub spaces_service: Option<String>,
    pub spaces_version: Option<String>,
    pub persistence_service: Option<String>,
}

impl NetworkInfo {
    /// Record a discovered item if its name is one of the known services.
    ///
    /// Returns `true` if the item was recognized.
    pub fn record(&mut self, name: &str, address: &str) -> bool {
        if name.eq_ignore_ascii_case(SPACES_SERVICE_NAME) {
            self.spaces_service = Some(address.to_string());
            true
        } else if name.eq_ignore_ascii_case(PERSISTENCE_SERVICE_NAME) {
            self.persistence_service = Some(address.to_string());
            true
        } else {
            false
        }
    }
}
