use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one venue session. Both the broker and the quote engine own
/// exactly one of these behind a lock.
///
/// Legal flow: `Stopped → Connecting → Connected → (Disconnected ⇄
/// Reconnecting) → Stopped`. Operations that need a live venue fail with a
/// connectivity error from any state other than `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Stopped,
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
}

impl SessionState {
    pub fn is_connected(self) -> bool {
        self == SessionState::Connected
    }

    /// True once a session has been started and not yet stopped.
    pub fn is_active(self) -> bool {
        self != SessionState::Stopped
    }

    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Stopped, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connecting, Stopped)
                | (Connected, Disconnected)
                | (Connected, Stopped)
                | (Disconnected, Reconnecting)
                | (Disconnected, Stopped)
                | (Reconnecting, Connected)
                | (Reconnecting, Disconnected)
                | (Reconnecting, Stopped)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Stopped => "STOPPED",
            SessionState::Connecting => "CONNECTING",
            SessionState::Connected => "CONNECTED",
            SessionState::Disconnected => "DISCONNECTED",
            SessionState::Reconnecting => "RECONNECTING",
        };
        write!(f, "{}", name)
    }
}
