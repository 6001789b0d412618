//! Connection event callbacks.
//!
//! A [`SocketCallback`] observes one client. Inbound events (`on_open`,
//! `on_text`, `on_binary` and the terminal `on_close`/`on_error` of a
//! connection attempt) fire on the connect task in arrival order. Failures
//! of queued writes fire `on_error` on the dispatch task.
//!
//! Callbacks run on Tokio worker threads and should return quickly.
//!
//! # Adapters
//!
//! [`TextOnly`] and [`BinaryOnly`] wrap a callback and drop the message
//! channel it does not care about.
//!
//! ```
//! use callback_websocket::{Error, SocketCallback, TextOnly};
//!
//! struct Printer;
//!
//! impl SocketCallback for Printer {
//!     fn on_open(&self) {}
//!     fn on_text(&self, text: String) {
//!         println!("{text}");
//!     }
//!     fn on_binary(&self, _data: Vec<u8>) {
//!         unreachable!("filtered by TextOnly");
//!     }
//!     fn on_close(&self, _code: u16, _reason: &str) {}
//!     fn on_error(&self, _error: Error) {}
//! }
//!
//! let callback = TextOnly(Printer);
//! callback.on_binary(vec![1, 2, 3]);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tracing::trace;

use crate::error::Error;

// ============================================================================
// SocketCallback
// ============================================================================

/// Observer for one WebSocket client.
pub trait SocketCallback: Send + Sync + 'static {
    /// The handshake succeeded.
    fn on_open(&self);

    /// A text message arrived.
    fn on_text(&self, text: String);

    /// A binary message arrived.
    fn on_binary(&self, data: Vec<u8>);

    /// The connection ended.
    ///
    /// `code` is `0` with reason `"EOF"` when the stream ended, `0` with
    /// `"SSL"` on a TLS failure, otherwise the peer's close code and reason.
    fn on_close(&self, code: u16, reason: &str);

    /// An operation failed.
    fn on_error(&self, error: Error);
}

impl<C: SocketCallback> SocketCallback for Arc<C> {
    fn on_open(&self) {
        (**self).on_open();
    }

    fn on_text(&self, text: String) {
        (**self).on_text(text);
    }

    fn on_binary(&self, data: Vec<u8>) {
        (**self).on_binary(data);
    }

    fn on_close(&self, code: u16, reason: &str) {
        (**self).on_close(code, reason);
    }

    fn on_error(&self, error: Error) {
        (**self).on_error(error);
    }
}

// ============================================================================
// Adapters
// ============================================================================

/// Forwards every event except binary messages.
#[derive(Debug, Clone, Default)]
pub struct TextOnly<C>(pub C);

impl<C: SocketCallback> SocketCallback for TextOnly<C> {
    fn on_open(&self) {
        self.0.on_open();
    }

    fn on_text(&self, text: String) {
        self.0.on_text(text);
    }

    fn on_binary(&self, data: Vec<u8>) {
        trace!(len = data.len(), "Binary message dropped by TextOnly");
    }

    fn on_close(&self, code: u16, reason: &str) {
        self.0.on_close(code, reason);
    }

    fn on_error(&self, error: Error) {
        self.0.on_error(error);
    }
}

/// Forwards every event except text messages.
#[derive(Debug, Clone, Default)]
pub struct BinaryOnly<C>(pub C);

impl<C: SocketCallback> SocketCallback for BinaryOnly<C> {
    fn on_open(&self) {
        self.0.on_open();
    }

    fn on_text(&self, text: String) {
        trace!(len = text.len(), "Text message dropped by BinaryOnly");
    }

    fn on_binary(&self, data: Vec<u8>) {
        self.0.on_binary(data);
    }

    fn on_close(&self, code: u16, reason: &str) {
        self.0.on_close(code, reason);
    }

    fn on_error(&self, error: Error) {
        self.0.on_error(error);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    #[derive(Default)]
    struct Log(Mutex<Vec<String>>);

    impl SocketCallback for Log {
        fn on_open(&self) {
            self.0.lock().push("open".into());
        }

        fn on_text(&self, text: String) {
            self.0.lock().push(format!("text:{text}"));
        }

        fn on_binary(&self, data: Vec<u8>) {
            self.0.lock().push(format!("binary:{}", data.len()));
        }

        fn on_close(&self, code: u16, reason: &str) {
            self.0.lock().push(format!("close:{code}:{reason}"));
        }

        fn on_error(&self, error: Error) {
            self.0.lock().push(format!("error:{error}"));
        }
    }

    fn drive(callback: &dyn SocketCallback) {
        callback.on_open();
        callback.on_text("hi".into());
        callback.on_binary(vec![1, 2]);
        callback.on_close(0, "EOF");
        callback.on_error(Error::NotConnected);
    }

    #[test]
    fn test_text_only_drops_binary() {
        let log = Arc::new(Log::default());
        drive(&TextOnly(Arc::clone(&log)));
        assert_eq!(
            *log.0.lock(),
            ["open", "text:hi", "close:0:EOF", "error:Socket not connected"]
        );
    }

    #[test]
    fn test_binary_only_drops_text() {
        let log = Arc::new(Log::default());
        drive(&BinaryOnly(Arc::clone(&log)));
        assert_eq!(
            *log.0.lock(),
            ["open", "binary:2", "close:0:EOF", "error:Socket not connected"]
        );
    }
}
