//! Connection-state model shared by every transport adapter.

use serde::{Deserialize, Serialize};

/// Connection state of a transport adapter.
///
/// Owned by each adapter. Commands may only be enqueued while
/// `Connected`; the transition `Connected -> Disconnected` triggers the
/// rejection sweep that flushes every queued and active command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No physical link
    #[default]
    Disconnected,
    /// Link establishment in progress
    Connecting,
    /// Link open, commands may flow
    Connected,
}

impl ConnectionState {
    /// Whether commands may be enqueued in this state.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert!(!ConnectionState::default().is_connected());
    }

    #[test]
    fn only_connected_allows_commands() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
    }
}
