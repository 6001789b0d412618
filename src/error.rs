//! Error types for the WebSocket client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! Construction and configuration return [`Result<T>`] directly. Everything
//! that happens on the connection itself (dial, handshake, frames, writes)
//! is reported through [`SocketCallback::on_error`] or
//! [`SocketCallback::on_close`] instead.
//!
//! ```ignore
//! use callback_websocket::{ConnectionHandle, Result};
//!
//! fn example() -> Result<ConnectionHandle> {
//!     ConnectionHandle::builder("wss://example.com/feed")
//!         .header("Cookie", "session=abcd")
//!         .build()
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::Url`], [`Error::InvalidArgument`] |
//! | Connection | [`Error::InvalidScheme`], [`Error::Dial`], [`Error::Tls`], [`Error::ConnectionClosed`], [`Error::NotConnected`] |
//! | Protocol | [`Error::Protocol`], [`Error::UnexpectedStatus`] |
//! | External | [`Error::Io`] |
//!
//! [`SocketCallback::on_error`]: crate::SocketCallback::on_error
//! [`SocketCallback::on_close`]: crate::SocketCallback::on_close

// ============================================================================
// Imports
// ============================================================================

use std::io::{Error as IoError, ErrorKind};
use std::result::Result as StdResult;

use thiserror::Error;
use url::ParseError as UrlError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when a client cannot be constructed as configured.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument passed to an operation.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// Target URL could not be parsed.
    #[error("Invalid URL: {0}")]
    Url(#[from] UrlError),

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// URL scheme is neither `ws` nor `wss`.
    #[error("Illegal scheme: {scheme}")]
    InvalidScheme {
        /// The rejected scheme.
        scheme: String,
    },

    /// TCP connection to the server failed.
    #[error("Failed to connect to {address}: {source}")]
    Dial {
        /// Host and port that were dialed.
        address: String,
        /// Underlying socket error.
        #[source]
        source: IoError,
    },

    /// TLS-layer failure during the TLS handshake or while decoding.
    #[error("TLS error: {message}")]
    Tls {
        /// Description of the TLS failure.
        message: String,
    },

    /// The stream ended: peer closed it or it was closed locally.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A write or close ran with no live socket.
    #[error("Socket not connected")]
    NotConnected,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Handshake or framing violation.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Server answered the upgrade request with a status other than 101.
    #[error("Unexpected handshake status {code}: {reason}")]
    UnexpectedStatus {
        /// HTTP status code.
        code: u16,
        /// Reason phrase from the status line.
        reason: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid scheme error.
    #[inline]
    pub fn invalid_scheme(scheme: impl Into<String>) -> Self {
        Self::InvalidScheme {
            scheme: scheme.into(),
        }
    }

    /// Creates a dial error.
    ///
    /// TLS failures surfacing through the dial are reclassified as
    /// [`Error::Tls`] so they report as an `SSL` close.
    pub fn dial(address: impl Into<String>, source: IoError) -> Self {
        if let Some(tls) = rustls_source(&source) {
            return Self::tls(tls.to_string());
        }
        Self::Dial {
            address: address.into(),
            source,
        }
    }

    /// Creates a TLS error.
    #[inline]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an unexpected status error.
    #[inline]
    pub fn unexpected_status(code: u16, reason: impl Into<String>) -> Self {
        Self::UnexpectedStatus {
            code,
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a handshake or framing violation.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol { .. } | Self::UnexpectedStatus { .. })
    }

    /// Returns `true` if the stream ended.
    ///
    /// Covers both an explicit [`Error::ConnectionClosed`] and a read that
    /// hit end of stream in the middle of a frame.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        match self {
            Self::ConnectionClosed => true,
            Self::Io(err) => err.kind() == ErrorKind::UnexpectedEof,
            _ => false,
        }
    }

    /// Returns `true` if this is a TLS-layer failure.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        match self {
            Self::Tls { .. } => true,
            Self::Io(err) => rustls_source(err).is_some(),
            _ => false,
        }
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidScheme { .. }
                | Self::Dial { .. }
                | Self::Tls { .. }
                | Self::ConnectionClosed
                | Self::NotConnected
        )
    }
}

/// Finds a `rustls::Error` wrapped inside an IO error.
///
/// `tokio-rustls` reports TLS failures as `InvalidData` IO errors carrying
/// the rustls error as their inner value.
fn rustls_source(err: &IoError) -> Option<&rustls::Error> {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
}

// ============================================================================
// Tests
// ============================================================================
