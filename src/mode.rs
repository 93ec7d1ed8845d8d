//! Requested versus effective operating mode.

use parking_lot::RwLock;

use crate::session::{Session, SessionState};

/// Operating mode of the engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Online,
    Offline,
}

/// Mode the engines actually operate in.
///
/// Online only if online was requested and the session is online.
pub fn effective_mode(requested: Mode, state: SessionState) -> Mode {
    match (requested, state) {
        (Mode::Online, SessionState::Online) => Mode::Online,
        _ => Mode::Offline,
    }
}

/// Tracks the requested mode and derives the effective one from the
/// session on every read, so it never goes stale.
pub struct ModeTracker {
    requested: RwLock<Mode>,
    session: RwLock<Session>,
}

impl ModeTracker {
    /// Starts with online requested.
    pub fn new(session: Session) -> Self {
        Self {
            requested: RwLock::new(Mode::Online),
            session: RwLock::new(session),
        }
    }

    pub fn requested(&self) -> Mode {
        *self.requested.read()
    }

    /// Returns the previous request.
    pub fn request(&self, mode: Mode) -> Mode {
        std::mem::replace(&mut *self.requested.write(), mode)
    }

    pub fn effective(&self) -> Mode {
        effective_mode(self.requested(), self.session.read().state())
    }

    /// Follow another session from now on.
    pub fn set_session(&self, session: Session) {
        *self.session.write() = session;
    }

    pub fn is_online(&self) -> bool {
        self.effective() == Mode::Online
    }
}
