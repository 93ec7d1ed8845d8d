//! Helpers for network addresses of the form `local@domain/resource`.

/// Strip the resource part of an address.
///
/// ```
/// use spacelink_proto::jid::bare;
/// assert_eq!(bare("alice@example.org/phone"), "alice@example.org");
/// assert_eq!(bare("pubsub.example.org"), "pubsub.example.org");
/// ```
pub fn bare(address: &str) -> &str {
    match address.find('/') {
        Some(pos) => &address[..pos],
        None => address,
    }
}

/// Domain part of an address.
pub fn domain(address: &str) -> &str {
    let bare = bare(address);
    match bare.find('@') {
        Some(pos) => &bare[pos + 1..],
        None => bare,
    }
}

/// Local part of an address, if any.
pub fn local(address: &str) -> Option<&str> {
    let bare = bare(address);
    bare.find('@').map(|pos| &bare[..pos])
}

/// Join a local part and a domain into a bare address.
pub fn join(local: &str, domain: &str) -> String {
    format!("{}@{}", local, domain)
}

/// Case-insensitive equality on bare addresses.
pub fn same_entity(a: &str, b: &str) -> bool {
    bare(a).eq_ignore_ascii_case(bare(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_full_address() {
        let addr = "bob@mirror-demo.eu/client";
        assert_eq!(bare(addr), "bob@mirror-demo.eu");
        assert_eq!(domain(addr), "mirror-demo.eu");
        assert_eq!(local(addr), Some("bob"));
    }

    #[test]
    fn component_has_no_local_part() {
        assert_eq!(local("spaces.mirror-demo.eu"), None);
        assert_eq!(domain("spaces.mirror-demo.eu"), "spaces.mirror-demo.eu");
    }

    #[test]
    fn same_entity_ignores_resource_and_case() {
        assert!(same_entity("Bob@Example.org/a", "bob@example.org"));
        assert!(!same_entity("bob@example.org", "alice@example.org"));
    }
}
