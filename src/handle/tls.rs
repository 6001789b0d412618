//! TLS trust configuration.
//!
//! Trust is a value owned by one [`ConnectionHandle`], applied to every
//! `wss` dial made through it. Nothing is shared process-wide.
//!
//! [`ConnectionHandle`]: super::ConnectionHandle

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::error::{Error, Result};

// ============================================================================
// TlsConfig
// ============================================================================

/// rustls client configuration used for `wss` connections.
#[derive(Clone)]
pub struct TlsConfig {
    config: Arc<ClientConfig>,
}

impl TlsConfig {
    /// Trusts the Mozilla root set shipped in `webpki-roots`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tls`] if the crypto provider rejects the default
    /// protocol versions.
    pub fn webpki() -> Result<Self> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Self::with_roots(roots)
    }

    /// Trusts exactly the given roots.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tls`] if the crypto provider rejects the default
    /// protocol versions.
    pub fn with_roots(roots: RootCertStore) -> Result<Self> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::tls(e.to_string()))?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self::from(config))
    }

    /// Returns the underlying rustls configuration.
    #[inline]
    #[must_use]
    pub fn client_config(&self) -> &Arc<ClientConfig> {
        &self.config
    }

    /// Creates a connector for one dial.
    #[inline]
    pub(crate) fn connector(&self) -> TlsConnector {
        TlsConnector::from(Arc::clone(&self.config))
    }
}

impl From<Arc<ClientConfig>> for TlsConfig {
    fn from(config: Arc<ClientConfig>) -> Self {
        Self { config }
    }
}

impl From<ClientConfig> for TlsConfig {
    fn from(config: ClientConfig) -> Self {
        Self::from(Arc::new(config))
    }
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("alpn_protocols", &self.config.alpn_protocols)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
