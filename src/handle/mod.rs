//! Connection configuration.
//!
//! A [`ConnectionHandle`] bundles everything a [`WebSocket`] needs to dial:
//! target URL, extra handshake headers, TLS trust and socket options. It is
//! built once and never changes for the life of the client.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ConnectionHandle`] | Immutable per-connection configuration |
//! | [`ConnectionHandleBuilder`] | Fluent configuration builder |
//! | [`ConnectOptions`] | Socket and decoder options |
//! | [`Header`] | Extra upgrade request header |
//! | [`TlsConfig`] | rustls trust for `wss` |
//!
//! [`WebSocket`]: crate::WebSocket

// ============================================================================
// Submodules
// ============================================================================

/// Handle and builder.
pub mod builder;

/// Options and headers.
pub mod options;

/// TLS trust configuration.
pub mod tls;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{ConnectionHandle, ConnectionHandleBuilder};
pub use options::{ConnectOptions, Header};
pub use tls::TlsConfig;
