//! Client side of the opening handshake (RFC 6455 Section 4.1).
//!
//! Builds the HTTP upgrade request, reads the server's response one byte at
//! a time, and validates `Sec-WebSocket-Accept` against the secret sent in
//! `Sec-WebSocket-Key`.
//!
//! The response reader never reads past the blank line that ends the
//! headers: the decode loop takes over the same stream and must see the
//! first frame byte next.

// ============================================================================
// Imports
// ============================================================================

use std::fmt::Write as _;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt};
use url::Url;

use crate::error::{Error, Result};
use crate::handle::Header;

// ============================================================================
// Constants
// ============================================================================

/// Fixed GUID appended to the key before hashing.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Name of the response header carrying the accept value.
const ACCEPT_HEADER: &str = "Sec-WebSocket-Accept";

/// Status code of a successful upgrade.
const SWITCHING_PROTOCOLS: u16 = 101;

/// Longest response line accepted, terminator excluded.
pub const MAX_LINE_LENGTH: usize = 8 * 1024;

/// Most response headers accepted.
pub const MAX_HEADERS: usize = 64;

// ============================================================================
// Secret & Accept
// ============================================================================

/// Generates a fresh `Sec-WebSocket-Key` value.
///
/// 16 random bytes, base64-encoded. Must not be reused across attempts.
#[must_use]
pub fn generate_secret() -> String {
    let nonce: [u8; 16] = rand::random();
    BASE64.encode(nonce).trim().to_owned()
}

/// Computes the `Sec-WebSocket-Accept` value expected for `secret`.
#[must_use]
pub fn compute_accept(secret: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(secret.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize()).trim().to_owned()
}

/// Checks a received accept value against `secret`.
///
/// Only the received value is trimmed; the comparison is exact.
///
/// # Errors
///
/// Returns [`Error::Protocol`] on mismatch.
pub fn validate_accept(secret: &str, server_value: &str) -> Result<()> {
    if compute_accept(secret) == server_value.trim() {
        Ok(())
    } else {
        Err(Error::protocol("Bad Sec-WebSocket-Accept header value"))
    }
}

// ============================================================================
// UpgradeTarget
// ============================================================================

/// Dial and request parameters derived from a `ws`/`wss` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeTarget {
    /// `true` for `wss`.
    pub secure: bool,
    /// Host without port, as written in the URL.
    pub host: String,
    /// Explicit port or the scheme default (80/443).
    pub port: u16,
    /// Path plus query, never empty.
    pub resource: String,
    /// `http://host` or `https://host`.
    pub origin: String,
}

impl UpgradeTarget {
    /// Derives the target from a URL.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidScheme`] if the scheme is not `ws` or `wss`
    /// - [`Error::Config`] if the URL has no host
    pub fn from_url(url: &Url) -> Result<Self> {
        let secure = match url.scheme() {
            "ws" => false,
            "wss" => true,
            other => return Err(Error::invalid_scheme(other)),
        };

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| Error::config(format!("URL has no host: {url}")))?
            .to_owned();

        let port = url.port().unwrap_or(if secure { 443 } else { 80 });

        let mut resource = match url.path() {
            "" => "/".to_owned(),
            path => path.to_owned(),
        };
        if let Some(query) = url.query().filter(|query| !query.is_empty()) {
            resource.push('?');
            resource.push_str(query);
        }

        let origin = format!("{}://{host}", if secure { "https" } else { "http" });

        Ok(Self {
            secure,
            host,
            port,
            resource,
            origin,
        })
    }

    /// Returns the `host:port` string used for dialing.
    #[inline]
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============================================================================
// Request
// ============================================================================

/// Builds the upgrade request, terminated by the blank line.
///
/// Extra headers follow the fixed ones in the order given.
#[must_use]
pub fn build_request(target: &UpgradeTarget, secret: &str, extra_headers: &[Header]) -> String {
    let mut request = String::with_capacity(256);
    let _ = write!(request, "GET {} HTTP/1.1\r\n", target.resource);
    request.push_str("Upgrade: websocket\r\n");
    request.push_str("Connection: Upgrade\r\n");
    let _ = write!(request, "Host: {}\r\n", target.host);
    let _ = write!(request, "Origin: {}\r\n", target.origin);
    let _ = write!(request, "Sec-WebSocket-Key: {secret}\r\n");
    request.push_str("Sec-WebSocket-Version: 13\r\n");
    for header in extra_headers {
        let _ = write!(request, "{}: {}\r\n", header.name, header.value);
    }
    request.push_str("\r\n");
    request
}

// ============================================================================
// Line Reader
// ============================================================================

/// Reads one line, byte at a time.
///
/// Strips the `\n` terminator and one trailing `\r`. Returns `None` if the
/// stream ends before a terminator.
///
/// # Errors
///
/// - [`Error::Protocol`] if the line runs past [`MAX_LINE_LENGTH`]
/// - [`Error::Io`] if the read fails
pub async fn read_line<R>(reader: &mut R) -> Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        if reader.read(&mut byte).await? == 0 {
            return Ok(None);
        }
        if byte[0] == b'\n' {
            break;
        }
        // One extra byte for the `\r` that may precede the terminator.
        if line.len() > MAX_LINE_LENGTH {
            return Err(Error::protocol(format!(
                "Response line exceeds {MAX_LINE_LENGTH} bytes"
            )));
        }
        line.push(byte[0]);
    }

    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(Some(String::from_utf8_lossy(&line).into_owned()))
}

// ============================================================================
// StatusLine
// ============================================================================

/// Parsed HTTP status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    /// Protocol version, e.g. `HTTP/1.1`.
    pub version: String,
    /// Status code.
    pub code: u16,
    /// Reason phrase, possibly empty.
    pub reason: String,
}

impl StatusLine {
    /// Parses `<version> <code> [<reason>]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the line is not a status line.
    pub fn parse(line: &str) -> Result<Self> {
        let invalid = || Error::protocol(format!("Invalid status line: {line:?}"));

        let mut parts = line.splitn(3, ' ');
        let version = parts.next().filter(|v| v.starts_with("HTTP/")).ok_or_else(invalid)?;
        let code = parts
            .next()
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(invalid)?;
        let reason = parts.next().unwrap_or_default().trim();

        Ok(Self {
            version: version.to_owned(),
            code,
            reason: reason.to_owned(),
        })
    }
}

// ============================================================================
// HandshakeResponse
// ============================================================================

/// Status line and headers of the upgrade response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// Parsed status line.
    pub status: StatusLine,
    /// Headers in arrival order.
    pub headers: Vec<(String, String)>,
}

impl HandshakeResponse {
    /// Reads the status line and all headers up to the blank line.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if there is no reply, the status line or a
    ///   header line is malformed, or the response is oversized
    /// - [`Error::UnexpectedStatus`] if the status is not 101
    pub async fn read<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let line = read_line(reader)
            .await?
            .filter(|line| !line.is_empty())
            .ok_or_else(|| Error::protocol("Received no reply from server"))?;

        let status = StatusLine::parse(&line)?;
        if status.code != SWITCHING_PROTOCOLS {
            return Err(Error::unexpected_status(status.code, status.reason));
        }

        let mut headers = Vec::new();
        while let Some(line) = read_line(reader).await? {
            if line.is_empty() {
                break;
            }
            if headers.len() == MAX_HEADERS {
                return Err(Error::protocol(format!(
                    "Response has more than {MAX_HEADERS} headers"
                )));
            }
            headers.push(parse_header(&line)?);
        }

        Ok(Self { status, headers })
    }

    /// Returns the first value of a header, matched case-sensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Validates `Sec-WebSocket-Accept` against the secret.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the header is missing or wrong.
    pub fn validate(&self, secret: &str) -> Result<()> {
        let accept = self
            .header(ACCEPT_HEADER)
            .ok_or_else(|| Error::protocol("No Sec-WebSocket-Accept header"))?;
        validate_accept(secret, accept)
    }
}

/// Splits `Name: value` at the first colon.
fn parse_header(line: &str) -> Result<(String, String)> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| Error::protocol(format!("Invalid header line: {line:?}")))?;
    Ok((name.trim().to_owned(), value.trim().to_owned()))
}

// ============================================================================
// Tests
// ============================================================================
