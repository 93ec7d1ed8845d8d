//! Session states and how link events map onto them.

use std::fmt;

use crate::net::LinkEvent;

/// Connection state of a [`Session`](super::Session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Offline,
    /// A connect, disconnect or reconnect is in progress.
    Pending,
    /// Authenticated and discovery finished.
    Online,
    /// The link broke or a connect failed.
    Error,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "OFFLINE",
            Self::Pending => "PENDING",
            Self::Online => "ONLINE",
            Self::Error => "ERROR",
        }
    }

    pub fn is_online(self) -> bool {
        self == Self::Online
    }

    /// Whether `connect` may start from this state.
    pub fn can_connect(self) -> bool {
        matches!(self, Self::Offline | Self::Error)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionEvent {
    pub previous: SessionState,
    pub current: SessionState,
}

/// State a link event moves the session to.
///
/// `ReconnectSucceeded` maps to `Pending`: the session has to log in again
/// before it is online.
pub fn state_for_link_event(event: &LinkEvent) -> SessionState {
    match event {
        LinkEvent::Closed => SessionState::Offline,
        LinkEvent::ClosedOnError(_)
        | LinkEvent::ReconnectingIn(_)
        | LinkEvent::ReconnectAbandoned(_) => SessionState::Error,
        LinkEvent::ReconnectFailed(_) | LinkEvent::ReconnectSucceeded => SessionState::Pending,
    }
}

/// Whether a link event applies while the session is in `current`.
///
/// Nothing applies after an explicit disconnect. A plain close during a
/// connect or after a failed one belongs to that operation.
pub fn link_event_applies(current: SessionState, event: &LinkEvent) -> bool {
    match current {
        SessionState::Offline => false,
        SessionState::Pending | SessionState::Error => !matches!(event, LinkEvent::Closed),
        SessionState::Online => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_event_mapping() {
        assert_eq!(state_for_link_event(&LinkEvent::Closed), SessionState::Offline);
        assert_eq!(
            state_for_link_event(&LinkEvent::ClosedOnError("reset".into())),
            SessionState::Error
        );
        assert_eq!(
            state_for_link_event(&LinkEvent::ReconnectingIn(5)),
            SessionState::Error
        );
        assert_eq!(
            state_for_link_event(&LinkEvent::ReconnectFailed("refused".into())),
            SessionState::Pending
        );
        assert_eq!(
            state_for_link_event(&LinkEvent::ReconnectAbandoned(3)),
            SessionState::Error
        );
    }

    #[test]
    fn explicit_disconnect_ignores_link() {
        assert!(!link_event_applies(
            SessionState::Offline,
            &LinkEvent::ReconnectSucceeded
        ));
        assert!(!link_event_applies(SessionState::Error, &LinkEvent::Closed));
        assert!(link_event_applies(SessionState::Online, &LinkEvent::Closed));
        assert!(link_event_applies(
            SessionState::Error,
            &LinkEvent::ReconnectSucceeded
        ));
    }

    #[test]
    fn connect_is_legal_from_offline_and_error() {
        assert!(SessionState::Offline.can_connect());
        assert!(SessionState::Error.can_connect());
        assert!(!SessionState::Pending.can_connect());
        assert!(!SessionState::Online.can_connect());
    }
}
