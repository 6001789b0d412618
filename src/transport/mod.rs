//! Connection engine and socket plumbing.
//!
//! # Architecture
//!
//! ```text
//!  caller ──connect()──► connect task ── dial ─► upgrade ─► decode loop ──► SocketCallback
//!    │                        │                                 ▲
//!    │                        └─install write half─► SocketSlot │ close signal
//!    │                                                   ▲      │
//!    └──send()/disconnect()──► DispatchQueue ──write/close┘─────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | [`WebSocket`] engine and connect task |
//! | `dispatch` | Serialized write/close queue |
//! | `socket` | Shared write half behind an async mutex |
//! | `state` | [`ConnectionState`] lifecycle |
//! | `stream` | Plain/TLS stream and [`dial`] |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket engine.
pub mod connection;

/// Dispatch queue.
mod dispatch;

/// Shared socket slot.
mod socket;

/// Lifecycle state.
pub mod state;

/// Plain or TLS stream.
pub mod stream;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::WebSocket;
pub use state::ConnectionState;
pub use stream::{MaybeTlsStream, Socket, dial};
