//! Callback-driven WebSocket client.
//!
//! This library speaks the client side of RFC 6455 over plain TCP or TLS
//! and reports everything that happens on the connection through a single
//! [`SocketCallback`].
//!
//! # Architecture
//!
//! Each [`WebSocket`] runs two Tokio tasks:
//!
//! - **Connect task**: dial, upgrade handshake, then the decode loop. Fires
//!   `on_open`, `on_text`, `on_binary` and the terminal `on_close` or
//!   `on_error`.
//! - **Dispatch task**: executes queued writes and the close one at a time,
//!   in submission order.
//!
//! Key design principles:
//!
//! - Callers never wait on the network (`connect` spawns, `send` enqueues)
//! - Frames never interleave on the wire
//! - Every connection attempt ends with exactly one terminal callback
//!
//! # Quick Start
//!
//! ```no_run
//! use callback_websocket::{Error, Result, SocketCallback, WebSocket};
//!
//! struct Printer;
//!
//! impl SocketCallback for Printer {
//!     fn on_open(&self) {
//!         println!("open");
//!     }
//!     fn on_text(&self, text: String) {
//!         println!("text: {text}");
//!     }
//!     fn on_binary(&self, data: Vec<u8>) {
//!         println!("binary: {} bytes", data.len());
//!     }
//!     fn on_close(&self, code: u16, reason: &str) {
//!         println!("closed: {code} {reason}");
//!     }
//!     fn on_error(&self, error: Error) {
//!         eprintln!("error: {error}");
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let handle = WebSocket::builder("wss://example.com/feed")
//!         .header("Cookie", "session=abcd")
//!         .build()?;
//!
//!     let socket = WebSocket::new(handle, Printer)?;
//!     socket.connect();
//!     socket.send("subscribe");
//!     socket.send(vec![0x01u8, 0x02]);
//!
//!     socket.close(1000, "done");
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`callback`] | [`SocketCallback`] trait and adapters |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`handle`] | [`ConnectionHandle`] configuration |
//! | [`protocol`] | Handshake and frame codec |
//! | [`transport`] | [`WebSocket`] engine, dispatch queue, streams |

// ============================================================================
// Modules
// ============================================================================

/// Connection event callbacks.
pub mod callback;

/// Error types and result aliases.
///
/// Construction returns [`Result<T>`]; connection failures arrive through
/// [`SocketCallback::on_error`].
pub mod error;

/// Connection configuration.
///
/// Use [`ConnectionHandle::builder()`] for headers, TLS trust and options.
pub mod handle;

/// RFC 6455 handshake and framing.
pub mod protocol;

/// Connection engine.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Callback types
pub use callback::{BinaryOnly, SocketCallback, TextOnly};

// Error types
pub use error::{Error, Result};

// Configuration types
pub use handle::{ConnectOptions, ConnectionHandle, ConnectionHandleBuilder, Header, TlsConfig};

// Protocol types
pub use protocol::{CloseFrame, Payload};

// Engine types
pub use transport::{ConnectionState, WebSocket};
