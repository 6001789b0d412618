//! Connection handle and its builder.
//!
//! # Example
//!
//! ```
//! use callback_websocket::ConnectionHandle;
//!
//! # fn example() -> callback_websocket::Result<()> {
//! let handle = ConnectionHandle::builder("ws://127.0.0.1:8889/websocket")
//!     .header("Cookie", "session=abcd")
//!     .build()?;
//!
//! assert_eq!(handle.url().path(), "/websocket");
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use url::Url;

use crate::error::Result;

use super::options::{ConnectOptions, Header};
use super::tls::TlsConfig;

// ============================================================================
// ConnectionHandle
// ============================================================================

/// Immutable per-connection configuration.
///
/// The scheme is not checked here; a non-`ws`/`wss` URL is reported through
/// the callback when the connection is attempted.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Target URL.
    url: Url,
    /// Extra upgrade request headers, in send order.
    headers: Vec<Header>,
    /// Trust for `wss`; `None` uses the webpki roots.
    tls: Option<TlsConfig>,
    /// Socket and decoder options.
    options: ConnectOptions,
}

impl ConnectionHandle {
    /// Creates a handle with default configuration.
    #[inline]
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            headers: Vec::new(),
            tls: None,
            options: ConnectOptions::default(),
        }
    }

    /// Starts a builder for the given URL string.
    #[inline]
    #[must_use]
    pub fn builder(url: impl Into<String>) -> ConnectionHandleBuilder {
        ConnectionHandleBuilder::new(url)
    }

    /// Returns the target URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the extra headers.
    #[inline]
    #[must_use]
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Returns the TLS trust override, if any.
    #[inline]
    #[must_use]
    pub fn tls(&self) -> Option<&TlsConfig> {
        self.tls.as_ref()
    }

    /// Returns the connect options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }
}

impl From<Url> for ConnectionHandle {
    fn from(url: Url) -> Self {
        Self::new(url)
    }
}

// ============================================================================
// ConnectionHandleBuilder
// ============================================================================

/// Builder for [`ConnectionHandle`].
#[derive(Debug, Clone)]
pub struct ConnectionHandleBuilder {
    /// Unparsed target URL.
    url: String,
    /// Extra headers.
    headers: Vec<Header>,
    /// TLS trust override.
    tls: Option<TlsConfig>,
    /// Connect options.
    options: ConnectOptions,
}

impl ConnectionHandleBuilder {
    /// Creates a builder for the given URL string.
    #[inline]
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            tls: None,
            options: ConnectOptions::default(),
        }
    }

    /// Appends an extra upgrade request header.
    #[inline]
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    /// Appends several extra headers.
    #[must_use]
    pub fn headers<I, H>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<Header>,
    {
        self.headers.extend(headers.into_iter().map(Into::into));
        self
    }

    /// Sets the TLS trust used for `wss`.
    #[inline]
    #[must_use]
    pub fn tls(mut self, tls: impl Into<TlsConfig>) -> Self {
        self.tls = Some(tls.into());
        self
    }

    /// Replaces the connect options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ConnectOptions) -> Self {
        self.options = options;
        self
    }

    /// Parses the URL and builds the handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`](crate::Error::Url) if the URL does not parse.
    pub fn build(self) -> Result<ConnectionHandle> {
        let url = Url::parse(&self.url)?;

        Ok(ConnectionHandle {
            url,
            headers: self.headers,
            tls: self.tls,
            options: self.options,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
