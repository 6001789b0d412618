//! Plain or TLS socket stream and dialing.

// ============================================================================
// Imports
// ============================================================================

use std::io;
use std::pin::{Pin, pin};
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use crate::error::{Error, Result};
use crate::handle::{ConnectOptions, TlsConfig};
use crate::protocol::UpgradeTarget;

// ============================================================================
// MaybeTlsStream
// ============================================================================

/// A stream that might be protected with TLS.
#[derive(Debug)]
#[allow(clippy::large_enum_variant)]
pub enum MaybeTlsStream<S> {
    /// Unencrypted socket stream.
    Plain(S),
    /// Encrypted socket stream using `rustls`.
    Tls(TlsStream<S>),
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for MaybeTlsStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => pin!(s).poll_read(cx, buf),
            Self::Tls(s) => pin!(s).poll_read(cx, buf),
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncWrite for MaybeTlsStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(s) => pin!(s).poll_write(cx, buf),
            Self::Tls(s) => pin!(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => pin!(s).poll_flush(cx),
            Self::Tls(s) => pin!(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => pin!(s).poll_shutdown(cx),
            Self::Tls(s) => pin!(s).poll_shutdown(cx),
        }
    }
}

/// Stream type produced by [`dial`].
pub type Socket = MaybeTlsStream<TcpStream>;

// ============================================================================
// Dial
// ============================================================================

/// Opens a TCP connection and, for `wss`, runs the TLS handshake.
///
/// Without an explicit `tls` value, `wss` dials trust the webpki roots.
///
/// # Errors
///
/// - [`Error::Dial`] if the TCP connection fails
/// - [`Error::Tls`] if the TLS handshake fails or the host is not a valid
///   server name
pub async fn dial(
    target: &UpgradeTarget,
    tls: Option<&TlsConfig>,
    options: &ConnectOptions,
) -> Result<Socket> {
    let address = target.address();
    let tcp = TcpStream::connect(&address)
        .await
        .map_err(|e| Error::dial(&address, e))?;

    if let Err(e) = tcp.set_nodelay(options.nodelay) {
        debug!(error = %e, "Failed to set TCP_NODELAY");
    }

    debug!(%address, secure = target.secure, "TCP connection established");

    if !target.secure {
        return Ok(MaybeTlsStream::Plain(tcp));
    }

    let connector = match tls {
        Some(tls) => tls.connector(),
        None => TlsConfig::webpki()?.connector(),
    };

    let domain = ServerName::try_from(server_name(&target.host).to_owned())
        .map_err(|e| Error::tls(format!("invalid server name {}: {e}", target.host)))?;

    let stream = connector
        .connect(domain, tcp)
        .await
        .map_err(|e| Error::dial(&address, e))?;

    debug!(%address, "TLS handshake completed");

    Ok(MaybeTlsStream::Tls(stream))
}

/// Strips the brackets `url` keeps around IPv6 literals.
fn server_name(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

// ============================================================================
// Tests
// ============================================================================
