#![allow(dead_code)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```ignore
//! mod common;
//! use common::*;
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use callback_websocket::{Error, SocketCallback};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;

// ============================================================================
// Logging
// ============================================================================

static INIT_LOGGING: Once = Once::new();

/// Installs a test-friendly subscriber once; honors `RUST_LOG`.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// Recorder
// ============================================================================

/// How long to wait for a callback before failing.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// One observed callback.
#[derive(Debug)]
pub enum Event {
    Open,
    Text(String),
    Binary(Vec<u8>),
    Close(u16, String),
    Error(Error),
}

/// Callback that forwards every event to an [`Events`] receiver.
pub struct Recorder(mpsc::UnboundedSender<Event>);

impl SocketCallback for Recorder {
    fn on_open(&self) {
        let _ = self.0.send(Event::Open);
    }

    fn on_text(&self, text: String) {
        let _ = self.0.send(Event::Text(text));
    }

    fn on_binary(&self, data: Vec<u8>) {
        let _ = self.0.send(Event::Binary(data));
    }

    fn on_close(&self, code: u16, reason: &str) {
        let _ = self.0.send(Event::Close(code, reason.to_string()));
    }

    fn on_error(&self, error: Error) {
        let _ = self.0.send(Event::Error(error));
    }
}

/// Receiving side of a [`Recorder`].
pub struct Events(mpsc::UnboundedReceiver<Event>);

impl Events {
    /// Waits for the next callback.
    pub async fn next(&mut self) -> Result<Event> {
        tokio::time::timeout(EVENT_TIMEOUT, self.0.recv())
            .await
            .context("timed out waiting for callback")?
            .context("recorder dropped")
    }

    /// Waits for `on_open`.
    pub async fn expect_open(&mut self) -> Result<()> {
        match self.next().await? {
            Event::Open => Ok(()),
            other => bail!("expected open, got {other:?}"),
        }
    }

    /// Waits for `on_text`.
    pub async fn expect_text(&mut self) -> Result<String> {
        match self.next().await? {
            Event::Text(text) => Ok(text),
            other => bail!("expected text, got {other:?}"),
        }
    }

    /// Waits for `on_close`.
    pub async fn expect_close(&mut self) -> Result<(u16, String)> {
        match self.next().await? {
            Event::Close(code, reason) => Ok((code, reason)),
            other => bail!("expected close, got {other:?}"),
        }
    }

    /// Waits for `on_error`.
    pub async fn expect_error(&mut self) -> Result<Error> {
        match self.next().await? {
            Event::Error(error) => Ok(error),
            other => bail!("expected error, got {other:?}"),
        }
    }

    /// Fails if any callback fires within `window`.
    pub async fn expect_quiet(&mut self, window: Duration) -> Result<()> {
        match tokio::time::timeout(window, self.0.recv()).await {
            Err(_) | Ok(None) => Ok(()),
            Ok(Some(event)) => bail!("unexpected callback {event:?}"),
        }
    }
}

/// Creates a connected recorder pair.
pub fn recorder() -> (Recorder, Events) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Recorder(tx), Events(rx))
}

// ============================================================================
// Raw Peer
// ============================================================================

/// Listener for hand-scripted servers.
pub async fn raw_listener() -> Result<(TcpListener, SocketAddr)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    Ok((listener, addr))
}

/// Server side of one connection, after the upgrade request was read.
pub struct RawPeer {
    pub stream: BufReader<TcpStream>,
    /// Request head, including the final blank line.
    pub request: String,
    /// Client's `Sec-WebSocket-Key`.
    pub key: String,
}

impl RawPeer {
    /// Accepts one connection and reads its upgrade request.
    pub async fn accept(listener: &TcpListener) -> Result<Self> {
        let (stream, _) = tokio::time::timeout(EVENT_TIMEOUT, listener.accept())
            .await
            .context("no client connected")??;
        Self::read_request(stream).await
    }

    /// Reads the upgrade request from an accepted connection.
    pub async fn read_request(stream: TcpStream) -> Result<Self> {
        let mut stream = BufReader::new(stream);

        let mut request = String::new();
        let mut key = String::new();
        loop {
            let mut line = String::new();
            if stream.read_line(&mut line).await? == 0 {
                bail!("request ended early");
            }
            if let Some(value) = line.strip_prefix("Sec-WebSocket-Key:") {
                key = value.trim().to_string();
            }
            request.push_str(&line);
            if line == "\r\n" {
                break;
            }
        }

        Ok(Self {
            stream,
            request,
            key,
        })
    }

    /// Writes raw bytes.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.get_mut().write_all(bytes).await?;
        self.stream.get_mut().flush().await?;
        Ok(())
    }

    /// Answers with a valid 101 response.
    pub async fn accept_upgrade(&mut self) -> Result<()> {
        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            derive_accept_key(self.key.as_bytes())
        );
        self.write(response.as_bytes()).await
    }

    /// Reads one client frame; returns the first header byte and the
    /// unmasked payload.
    pub async fn read_frame(&mut self) -> Result<(u8, Vec<u8>)> {
        let mut head = [0u8; 2];
        self.stream.read_exact(&mut head).await?;
        if head[1] & 0x80 == 0 {
            bail!("client frame is not masked");
        }

        let len = match head[1] & 0x7F {
            126 => u64::from(self.stream.read_u16().await?),
            127 => self.stream.read_u64().await?,
            n => u64::from(n),
        };

        let mut mask = [0u8; 4];
        self.stream.read_exact(&mut mask).await?;

        let mut payload = vec![0u8; usize::try_from(len)?];
        self.stream.read_exact(&mut payload).await?;
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= mask[i % 4];
        }

        Ok((head[0], payload))
    }

    /// Waits for the client to shut its side down; returns any bytes it
    /// sent first.
    pub async fn expect_eof(&mut self) -> Result<Vec<u8>> {
        let mut rest = Vec::new();
        tokio::time::timeout(EVENT_TIMEOUT, self.stream.read_to_end(&mut rest))
            .await
            .context("client never closed")??;
        Ok(rest)
    }

    /// Echoes data frames, answers pings and echoes the close frame.
    ///
    /// Returns once the close is echoed or the client goes away.
    pub async fn echo(mut self) {
        while let Ok((head, payload)) = self.read_frame().await {
            let reply = match head & 0x0F {
                0x1 | 0x2 => server_frame(head, &payload),
                0x9 => server_frame(0x8A, &payload),
                0x8 => {
                    let _ = self.write(&server_frame(0x88, &payload)).await;
                    break;
                }
                _ => continue,
            };
            if self.write(&reply).await.is_err() {
                break;
            }
        }
    }
}

// ============================================================================
// Echo Server
// ============================================================================

/// Serves every connection with [`RawPeer::echo`] after a valid upgrade.
///
/// Returns the `ws://` URL and the number of accepted TCP connections.
pub async fn echo_server() -> Result<(String, Arc<AtomicUsize>)> {
    let (listener, addr) = raw_listener().await?;
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let Ok(mut peer) = RawPeer::read_request(stream).await else {
                    return;
                };
                if peer.accept_upgrade().await.is_ok() {
                    peer.echo().await;
                }
            });
        }
    });

    Ok((format!("ws://{addr}/"), accepted))
}

/// Accepts connections with tungstenite's server handshake.
///
/// Its response spells the accept header `sec-websocket-accept`.
pub async fn lowercase_accept_server() -> Result<String> {
    let (listener, addr) = raw_listener().await?;
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = tokio_tungstenite::accept_async(stream).await;
            });
        }
    });
    Ok(format!("ws://{addr}/"))
}

// ============================================================================
// Frames
// ============================================================================

/// Encodes an unmasked server frame.
pub fn server_frame(first_byte: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![first_byte];
    match payload.len() {
        len @ 0..=125 => frame.push(len as u8),
        len @ 126..=0xFFFF => {
            frame.push(126);
            frame.extend_from_slice(&(len as u16).to_be_bytes());
        }
        len => {
            frame.push(127);
            frame.extend_from_slice(&(len as u64).to_be_bytes());
        }
    }
    frame.extend_from_slice(payload);
    frame
}
