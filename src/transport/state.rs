//! Connection lifecycle state.

use std::fmt;

/// Lifecycle of a [`WebSocket`](crate::WebSocket).
///
/// ```text
/// Idle ──connect──► Connecting ──101 + accept──► Open
///                        │                        │
///                        └──────────┬─────────────┘
///                                   ▼
///                          Closed { code, reason } ──connect──► Connecting
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// `connect` was never called.
    #[default]
    Idle,
    /// Dialing or waiting for the upgrade response.
    Connecting,
    /// Handshake accepted; frames flow.
    Open,
    /// The last attempt ended.
    ///
    /// `code` is the peer's close code, or `0` when the connection ended
    /// without a close frame, in which case `reason` is `"EOF"`, `"SSL"`
    /// or the error message.
    Closed {
        /// Close status code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

impl ConnectionState {
    /// Returns `true` in the `Open` state.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` in the `Closed` state.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }

    /// Creates a `Closed` state.
    #[inline]
    #[must_use]
    pub fn closed(code: u16, reason: impl Into<String>) -> Self {
        Self::Closed {
            code,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Connecting => f.write_str("connecting"),
            Self::Open => f.write_str("open"),
            Self::Closed { code, reason } => write!(f, "closed ({code}: {reason})"),
        }
    }
}
