//! The WebSocket client engine.
//!
//! A [`WebSocket`] owns two Tokio tasks:
//!
//! - **connect task**: spawned per [`connect`](WebSocket::connect). Dials,
//!   writes the upgrade request, validates the response, then runs the
//!   decode loop and fires every inbound callback in frame order.
//! - **dispatch task**: spawned once at construction. Performs every
//!   outbound write and the close, one at a time, in submission order.
//!
//! # Terminal Callbacks
//!
//! Every connection attempt ends with exactly one of:
//!
//! | Outcome | Callback |
//! |---------|----------|
//! | Peer close frame | `on_close(code, reason)` |
//! | Stream ended, or closed locally | `on_close(0, "EOF")` |
//! | TLS failure | `on_close(0, "SSL")` |
//! | Anything else | `on_error(error)` |
//!
//! A failed attempt leaves no socket behind: later sends report
//! [`Error::NotConnected`] instead of reaching the old stream.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncWriteExt, ReadHalf};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::callback::SocketCallback;
use crate::error::{Error, Result};
use crate::handle::{ConnectionHandle, ConnectionHandleBuilder};
use crate::protocol::{
    CloseFrame, FrameCodec, FrameSink, HandshakeResponse, OpCode, Payload, UpgradeTarget,
    build_request, generate_secret,
};

use super::dispatch::{DispatchQueue, DispatchTask, WeakDispatcher};
use super::socket::{Generation, SocketSlot};
use super::state::ConnectionState;
use super::stream::{Socket, dial};

// ============================================================================
// Constants
// ============================================================================

/// Close reason reported when the stream ends without a close frame.
const EOF_REASON: &str = "EOF";

/// Close reason reported on TLS failures.
const SSL_REASON: &str = "SSL";

// ============================================================================
// WebSocket
// ============================================================================

/// Callback-driven WebSocket client.
///
/// Must be created inside a Tokio runtime. No method blocks on the network:
/// [`connect`](Self::connect) spawns, [`send`](Self::send) and
/// [`disconnect`](Self::disconnect) enqueue.
///
/// Dropping the client tears down its dispatch task, which closes any live
/// socket after the already queued writes.
///
/// # Example
///
/// ```no_run
/// use callback_websocket::{Error, SocketCallback, WebSocket};
///
/// struct Echo;
///
/// impl SocketCallback for Echo {
///     fn on_open(&self) {}
///     fn on_text(&self, text: String) {
///         println!("{text}");
///     }
///     fn on_binary(&self, _data: Vec<u8>) {}
///     fn on_close(&self, code: u16, reason: &str) {
///         println!("closed: {code} {reason}");
///     }
///     fn on_error(&self, error: Error) {
///         eprintln!("{error}");
///     }
/// }
///
/// # async fn run() -> callback_websocket::Result<()> {
/// let socket = WebSocket::from_url("wss://echo.example.com/", Echo)?;
/// socket.connect();
/// socket.send("hello");
/// # Ok(())
/// # }
/// ```
pub struct WebSocket {
    handle: Arc<ConnectionHandle>,
    callback: Arc<dyn SocketCallback>,
    runtime: Handle,
    codec: FrameCodec,
    socket: Arc<SocketSlot>,
    dispatcher: DispatchQueue,
    state: Arc<Mutex<ConnectionState>>,
    /// Current or last connect task.
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocket {
    /// Creates a client for `handle`.
    ///
    /// Spawns the dispatch task on the current runtime. Nothing is dialed
    /// until [`connect`](Self::connect).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when called outside a Tokio runtime.
    pub fn new(handle: ConnectionHandle, callback: impl SocketCallback) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::config(format!("no Tokio runtime available: {e}")))?;

        let callback: Arc<dyn SocketCallback> = Arc::new(callback);
        let socket = Arc::new(SocketSlot::default());
        let dispatcher = DispatchQueue::spawn(&runtime, Arc::clone(&socket), Arc::clone(&callback));
        let codec = FrameCodec::new(handle.options().max_message_size);

        debug!(url = %handle.url(), "WebSocket created");

        Ok(Self {
            handle: Arc::new(handle),
            callback,
            runtime,
            codec,
            socket,
            dispatcher,
            state: Arc::new(Mutex::new(ConnectionState::Idle)),
            worker: Mutex::new(None),
        })
    }

    /// Creates a client for `url` with default configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if `url` does not parse
    /// - [`Error::Config`] when called outside a Tokio runtime
    pub fn from_url(url: &str, callback: impl SocketCallback) -> Result<Self> {
        Self::new(ConnectionHandle::new(Url::parse(url)?), callback)
    }

    /// Starts configuring a connection to `url`.
    #[inline]
    #[must_use]
    pub fn builder(url: impl Into<String>) -> ConnectionHandleBuilder {
        ConnectionHandle::builder(url)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the connection configuration.
    #[inline]
    #[must_use]
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.lock().clone()
    }

    /// Returns `true` while the connect task is running.
    ///
    /// This covers dialing and the handshake as well as the open connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Starts a connection attempt.
    ///
    /// Does nothing while an earlier attempt is still running. The outcome
    /// arrives through the callback.
    pub fn connect(&self) {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|w| !w.is_finished()) {
            debug!("Connect task already running, ignoring connect");
            return;
        }

        *self.state.lock() = ConnectionState::Connecting;
        self.socket.begin_attempt();

        let task = ConnectTask {
            handle: Arc::clone(&self.handle),
            callback: Arc::clone(&self.callback),
            codec: self.codec,
            socket: Arc::clone(&self.socket),
            dispatcher: self.dispatcher.downgrade(),
            state: Arc::clone(&self.state),
        };

        info!(url = %self.handle.url(), "Connecting");
        *worker = Some(self.runtime.spawn(task.run()));
    }

    /// Queues a text or binary message.
    pub fn send(&self, payload: impl Into<Payload>) {
        let payload = payload.into();
        trace!(opcode = ?payload.opcode(), len = payload.as_bytes().len(), "Sending message");
        self.dispatcher
            .enqueue(DispatchTask::Write(self.codec.frame(&payload)));
    }

    /// Queues a ping.
    ///
    /// Payloads over 125 bytes are reported through `on_error`.
    pub fn ping(&self, payload: impl Into<Vec<u8>>) {
        match self.codec.control(OpCode::Ping, payload.into()) {
            Ok(frame) => self.dispatcher.enqueue(DispatchTask::Write(frame)),
            Err(e) => self.callback.on_error(e),
        }
    }

    /// Queues a close frame followed by the close.
    ///
    /// Does nothing if [`connect`](Self::connect) was never called.
    pub fn close(&self, code: u16, reason: &str) {
        if self.is_idle() {
            debug!("Never connected, ignoring close");
            return;
        }

        let frame = self.codec.close(&CloseFrame::new(code, reason));
        self.dispatcher.enqueue(DispatchTask::Write(frame));
        self.dispatcher.enqueue(DispatchTask::Close);
    }

    /// Queues the close.
    ///
    /// Does nothing if [`connect`](Self::connect) was never called. While
    /// the attempt is still dialing, the close is applied as soon as the
    /// socket exists and the attempt ends with `on_close(0, "EOF")`. A close
    /// with no live socket and no attempt reports [`Error::NotConnected`]
    /// through `on_error`.
    pub fn disconnect(&self) {
        if self.is_idle() {
            debug!("Never connected, ignoring disconnect");
            return;
        }

        self.dispatcher.enqueue(DispatchTask::Close);
    }

    fn is_idle(&self) -> bool {
        matches!(*self.state.lock(), ConnectionState::Idle)
    }
}

impl fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocket")
            .field("url", &self.handle.url().as_str())
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ConnectTask
// ============================================================================

/// Everything one connection attempt needs, moved into its task.
struct ConnectTask {
    handle: Arc<ConnectionHandle>,
    callback: Arc<dyn SocketCallback>,
    codec: FrameCodec,
    socket: Arc<SocketSlot>,
    dispatcher: WeakDispatcher,
    state: Arc<Mutex<ConnectionState>>,
}

impl ConnectTask {
    async fn run(self) {
        let mut generation = None;
        let outcome = self.session(&mut generation).await;
        self.finish(generation, outcome).await;
    }

    /// Dials, handshakes and decodes until the connection ends.
    ///
    /// Returns the peer's close frame on a clean close. `generation` is set
    /// once the socket is installed.
    async fn session(&self, generation: &mut Option<Generation>) -> Result<CloseFrame> {
        let target = UpgradeTarget::from_url(self.handle.url())?;
        let stream = dial(&target, self.handle.tls(), self.handle.options()).await?;

        let secret = generate_secret();
        let request = build_request(&target, &secret, self.handle.headers());

        let (mut reader, mut writer) = tokio::io::split(stream);
        writer.write_all(request.as_bytes()).await?;
        writer.flush().await?;
        trace!(resource = %target.resource, "Upgrade request sent");

        let (mut closed, installed) = self.socket.install(writer).await?;
        *generation = Some(installed);

        tokio::select! {
            result = self.handshake_and_decode(&mut reader, &secret, installed) => result,
            _ = &mut closed => {
                debug!("Socket closed locally");
                Err(Error::ConnectionClosed)
            }
        }
    }

    async fn handshake_and_decode(
        &self,
        reader: &mut ReadHalf<Socket>,
        secret: &str,
        generation: Generation,
    ) -> Result<CloseFrame> {
        let response = HandshakeResponse::read(reader).await?;
        response.validate(secret)?;

        *self.state.lock() = ConnectionState::Open;
        info!(url = %self.handle.url(), "WebSocket open");
        self.callback.on_open();

        let mut sink = DecodeSink {
            callback: self.callback.as_ref(),
            dispatcher: &self.dispatcher,
            codec: self.codec,
            generation,
            close: None,
        };
        self.codec.start(reader, &mut sink).await?;

        Ok(sink.close.unwrap_or_default())
    }

    /// Fires the terminal callback for this attempt.
    ///
    /// On failure the attempt's socket is dropped before the callback runs.
    async fn finish(&self, generation: Option<Generation>, outcome: Result<CloseFrame>) {
        let error = match (outcome, generation) {
            (Ok(frame), Some(generation)) => {
                info!(code = frame.code, reason = %frame.reason, "Peer closed connection");
                *self.state.lock() = ConnectionState::closed(frame.code, frame.reason.as_str());
                self.callback.on_close(frame.code, &frame.reason);

                let echo = self.codec.close(&frame);
                self.dispatcher
                    .enqueue(DispatchTask::Reply(generation, echo));
                self.dispatcher
                    .enqueue(DispatchTask::CloseGeneration(generation));
                return;
            }
            (Ok(_), None) => Error::ConnectionClosed,
            (Err(e), _) => e,
        };

        self.socket.clear(generation).await;

        if error.is_eof() {
            info!("Connection ended");
            *self.state.lock() = ConnectionState::closed(0, EOF_REASON);
            self.callback.on_close(0, EOF_REASON);
        } else if error.is_tls() {
            warn!(error = %error, "TLS failure");
            *self.state.lock() = ConnectionState::closed(0, SSL_REASON);
            self.callback.on_close(0, SSL_REASON);
        } else {
            warn!(error = %error, "Connection failed");
            *self.state.lock() = ConnectionState::closed(0, error.to_string());
            self.callback.on_error(error);
        }
    }
}

// ============================================================================
// DecodeSink
// ============================================================================

/// Routes decoded frames to the callback and the dispatch queue.
struct DecodeSink<'a> {
    callback: &'a dyn SocketCallback,
    dispatcher: &'a WeakDispatcher,
    codec: FrameCodec,
    generation: Generation,
    close: Option<CloseFrame>,
}

impl FrameSink for DecodeSink<'_> {
    fn text(&mut self, text: String) {
        self.callback.on_text(text);
    }

    fn binary(&mut self, data: Vec<u8>) {
        self.callback.on_binary(data);
    }

    fn ping(&mut self, payload: Vec<u8>) {
        match self.codec.control(OpCode::Pong, payload) {
            Ok(pong) => {
                trace!("Answering ping");
                self.dispatcher
                    .enqueue(DispatchTask::Reply(self.generation, pong));
            }
            Err(e) => warn!(error = %e, "Failed to encode pong"),
        }
    }

    fn close(&mut self, frame: CloseFrame) {
        self.close = Some(frame);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    use crate::protocol::compute_accept;

    /// Forwards every event as a string.
    struct Events(mpsc::UnboundedSender<String>);

    impl SocketCallback for Events {
        fn on_open(&self) {
            let _ = self.0.send("open".into());
        }
        fn on_text(&self, text: String) {
            let _ = self.0.send(format!("text:{text}"));
        }
        fn on_binary(&self, data: Vec<u8>) {
            let _ = self.0.send(format!("binary:{data:?}"));
        }
        fn on_close(&self, code: u16, reason: &str) {
            let _ = self.0.send(format!("close:{code}:{reason}"));
        }
        fn on_error(&self, error: Error) {
            let _ = self.0.send(format!("error:{error}"));
        }
    }

    fn events() -> (Events, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Events(tx), rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for callback")
            .expect("callback channel closed")
    }

    /// Accepts one connection, answers the upgrade, then writes `frames`.
    async fn serve_once(frames: Vec<u8>) -> (u16, tokio::task::JoinHandle<Vec<u8>>) {
        serve(
            |key| {
                format!(
                    "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\
                     Connection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
                    compute_accept(key)
                )
            },
            frames,
        )
        .await
    }

    /// Accepts one connection and answers the request with `respond(key)`
    /// followed by `frames`. Resolves to every byte the client sent after
    /// its request.
    async fn serve(
        respond: fn(&str) -> String,
        frames: Vec<u8>,
    ) -> (u16, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut stream = BufReader::new(stream);

            let mut key = String::new();
            loop {
                let mut line = String::new();
                stream.read_line(&mut line).await.unwrap();
                if let Some(value) = line.strip_prefix("Sec-WebSocket-Key: ") {
                    key = value.trim().to_string();
                }
                if line == "\r\n" {
                    break;
                }
            }

            let response = respond(&key);
            stream.get_mut().write_all(response.as_bytes()).await.unwrap();
            stream.get_mut().write_all(&frames).await.unwrap();

            let mut rest = Vec::new();
            let _ = stream.read_to_end(&mut rest).await;
            rest
        });

        (port, server)
    }

    #[test]
    fn test_new_outside_runtime_is_config_error() {
        let (callback, _rx) = events();
        let err = WebSocket::from_url("ws://127.0.0.1:1/", callback).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_disconnect_before_connect_is_noop() {
        let (callback, mut rx) = events();
        let socket = WebSocket::from_url("ws://127.0.0.1:1/", callback).unwrap();

        socket.disconnect();
        socket.close(1000, "bye");

        assert_eq!(socket.state(), ConnectionState::Idle);
        assert!(!socket.is_connected());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_oversized_ping_reports_invalid_argument() {
        let (callback, mut rx) = events();
        let socket = WebSocket::from_url("ws://127.0.0.1:1/", callback).unwrap();

        socket.ping(vec![0u8; 126]);

        assert!(next(&mut rx).await.starts_with("error:Invalid argument"));
    }

    #[tokio::test]
    async fn test_peer_close_frame_is_reported_and_echoed() {
        // Unmasked server close frame: 1000 "bye".
        let (port, server) = serve_once(vec![0x88, 0x05, 0x03, 0xE8, b'b', b'y', b'e']).await;
        let (callback, mut rx) = events();
        let socket = WebSocket::from_url(&format!("ws://127.0.0.1:{port}/"), callback).unwrap();

        socket.connect();
        assert_eq!(next(&mut rx).await, "open");
        assert_eq!(next(&mut rx).await, "close:1000:bye");
        assert_eq!(socket.state(), ConnectionState::closed(1000, "bye"));

        // Masked echo: header, mask, then 5 payload bytes.
        let echoed = server.await.unwrap();
        assert_eq!(echoed.len(), 2 + 4 + 5);
        assert_eq!(echoed[0], 0x88);
        assert_eq!(echoed[1], 0x80 | 5);
    }

    #[tokio::test]
    async fn test_send_after_rejected_upgrade_is_not_connected() {
        let (port, server) = serve(
            |_| "HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n".to_string(),
            Vec::new(),
        )
        .await;
        let (callback, mut rx) = events();
        let socket = WebSocket::from_url(&format!("ws://127.0.0.1:{port}/"), callback).unwrap();

        socket.connect();
        assert!(next(&mut rx).await.starts_with("error:Unexpected handshake status 200"));

        socket.send("after failure");
        assert_eq!(next(&mut rx).await, "error:Socket not connected");

        // The stream was shut down by the failed attempt; nothing followed.
        assert!(server.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pong_answers_ping_before_close() {
        // Ping "hi", then close 1000.
        let frames = vec![0x89, 0x02, b'h', b'i', 0x88, 0x02, 0x03, 0xE8];
        let (port, server) = serve_once(frames).await;
        let (callback, mut rx) = events();
        let socket = WebSocket::from_url(&format!("ws://127.0.0.1:{port}/"), callback).unwrap();

        socket.connect();
        assert_eq!(next(&mut rx).await, "open");
        assert_eq!(next(&mut rx).await, "close:1000:");

        // Masked pong (2 + 4 + 2), then the masked close echo (2 + 4 + 2).
        let sent = server.await.unwrap();
        assert_eq!(sent.len(), 16);
        assert_eq!(sent[0], 0x8A);
        assert_eq!(sent[8], 0x88);
    }
}
