//! Connection lifecycle states.

use std::fmt;

/// ```text
/// Idle ─connect()─▶ Connecting ─CONNECTED─▶ Connected
///                       │                      │ transport error / close
///                       ▼                      ▼
///                  Reconnecting ◀──────── Reconnecting ─retry─▶ Connected
///
/// any active state ─last disconnect()─▶ Closed ─connect()─▶ Connecting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

impl ConnectionState {
    /// `true` for states where `connect()` has to start a new transport
    pub fn is_dormant(self) -> bool {
        matches!(self, ConnectionState::Idle | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}
