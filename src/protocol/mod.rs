//! WebSocket wire protocol.
//!
//! This module covers everything that touches bytes on the wire: the
//! opening handshake and the frame codec.
//!
//! # Handshake
//!
//! ```text
//! Client                                        Server
//!   │  GET /path HTTP/1.1                          │
//!   │  Upgrade / Connection / Host / Origin        │
//!   │  Sec-WebSocket-Key: <secret>                 │
//!   │─────────────────────────────────────────────►│
//!   │  HTTP/1.1 101 Switching Protocols            │
//!   │  Sec-WebSocket-Accept: base64(sha1(key+GUID))│
//!   │◄─────────────────────────────────────────────│
//!   │             frames from here on              │
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `handshake` | Secret, accept key, request and response |
//! | `frame` | Single-frame encoding and parsing |
//! | `codec` | Outbound payload framing and the decode loop |

// ============================================================================
// Submodules
// ============================================================================

/// Outbound framing and the inbound decode loop.
pub mod codec;

/// Frame header layout, masking and close payloads.
pub mod frame;

/// Opening handshake.
pub mod handshake;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{DEFAULT_MAX_MESSAGE_SIZE, FrameCodec, FrameSink, Payload};
pub use frame::{CloseFrame, Frame, OpCode};
pub use handshake::{
    HandshakeResponse, MAX_HEADERS, MAX_LINE_LENGTH, StatusLine, UpgradeTarget, WS_GUID,
    build_request, compute_accept, generate_secret, read_line, validate_accept,
};
