//! Connection options and handshake headers.
//!
//! Both types are plain data with `serde` support so they can be loaded
//! from a configuration file alongside the target URL.
//!
//! # Example
//!
//! ```
//! use callback_websocket::{ConnectOptions, Header};
//!
//! let options = ConnectOptions::new()
//!     .with_nodelay(false)
//!     .with_max_message_size(1024 * 1024);
//!
//! let cookie = Header::new("Cookie", "session=abcd");
//! assert_eq!(cookie.to_string(), "Cookie: session=abcd");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::protocol::DEFAULT_MAX_MESSAGE_SIZE;

// ============================================================================
// Header
// ============================================================================

/// Extra header sent with the upgrade request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Header name, sent as written.
    pub name: String,
    /// Header value.
    pub value: String,
}

impl Header {
    /// Creates a header.
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

impl<N: Into<String>, V: Into<String>> From<(N, V)> for Header {
    fn from((name, value): (N, V)) -> Self {
        Self::new(name, value)
    }
}

// ============================================================================
// ConnectOptions
// ============================================================================

/// Socket and decoder options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectOptions {
    /// Disable Nagle's algorithm on the TCP socket.
    pub nodelay: bool,

    /// Largest inbound message accepted, across all fragments.
    pub max_message_size: u64,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            nodelay: true,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Sets TCP_NODELAY.
    #[inline]
    #[must_use]
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Sets the inbound message size limit.
    #[inline]
    #[must_use]
    pub fn with_max_message_size(mut self, bytes: u64) -> Self {
        self.max_message_size = bytes;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
