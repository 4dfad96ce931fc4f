//! Connection status as seen by the session.
//!
//! ```text
//!  Connecting ──► Connected
//!       ▲             │
//!       │             ▼
//!       └──────── Disconnected   (reconnect after a fixed delay)
//! ```

use std::time::Instant;

// ── ConnectionStatus ─────────────────────────────────────────────

/// The current phase of the link to the verification service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// A connect attempt is in flight. Initial state.
    #[default]
    Connecting,

    /// The channel is open.
    Connected {
        /// When the channel opened.
        since: Instant,
    },

    /// The channel closed or failed; a reconnect is pending.
    Disconnected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected { .. } => write!(f, "Connected"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// How long the channel has been open, `None` unless connected.
    pub fn connected_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Connected { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────
    //
    // Unlike a handshake protocol, every transition here is legal from
    // every state: the channel can open, drop or be retried at any time.

    /// A (re)connect attempt started.
    pub fn begin_connect(&mut self) {
        *self = Self::Connecting;
    }

    /// The channel opened.
    pub fn open(&mut self) {
        *self = Self::Connected {
            since: Instant::now(),
        };
    }

    /// The channel closed or failed.
    pub fn drop_connection(&mut self) {
        *self = Self::Disconnected;
    }
}

// ── Tests ────────────────────────────────────────────────────────
