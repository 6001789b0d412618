//! Shared write half of the live socket.
//!
//! The connect task installs the write half after sending the upgrade
//! request; from then on only dispatch tasks touch it. Every write holds
//! the slot's lock from the first byte through the flush, so two frames can
//! never interleave on the wire.
//!
//! Each installed socket carries a `oneshot` sender. Taking the socket out
//! of the slot (close task, failed attempt or teardown) drops that sender,
//! which wakes the decode loop blocked on the read half.
//!
//! # Generations
//!
//! Every install gets a new [`Generation`]. Frames the decode loop queues on
//! its own behalf (pongs, the close echo) are tagged with it and skipped
//! once that socket has left the slot, so they never reach a later
//! connection.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, trace};

use crate::error::{Error, Result};

use super::stream::Socket;

// ============================================================================
// Types
// ============================================================================

/// Resolves when the installed socket is closed locally.
pub(crate) type ClosedSignal = oneshot::Receiver<()>;

/// Identifies one installed socket.
pub(crate) type Generation = u64;

/// Write half of the live socket plus its close signal.
struct LiveSocket<W> {
    writer: W,
    generation: Generation,
    /// Dropped (or fired) when the socket leaves the slot.
    closed_tx: oneshot::Sender<()>,
}

impl<W: AsyncWrite + Unpin> LiveSocket<W> {
    async fn shutdown(self) -> Result<()> {
        let Self {
            mut writer,
            closed_tx,
            ..
        } = self;
        let _ = closed_tx.send(());
        writer.shutdown().await?;
        Ok(())
    }
}

/// Slot contents.
struct SlotState<W> {
    live: Option<LiveSocket<W>>,
    /// A close arrived while an attempt was still dialing.
    close_requested: bool,
    /// Set by teardown; later installs are refused.
    retired: bool,
    next_generation: Generation,
}

// ============================================================================
// SocketSlot
// ============================================================================

/// The socket reference shared by the connect task and the dispatch task.
pub(crate) struct SocketSlot<W = WriteHalf<Socket>> {
    state: Mutex<SlotState<W>>,
    /// An attempt has started and not yet installed or ended.
    connecting: AtomicBool,
}

impl<W> Default for SocketSlot<W> {
    fn default() -> Self {
        Self {
            state: Mutex::new(SlotState {
                live: None,
                close_requested: false,
                retired: false,
                next_generation: 0,
            }),
            connecting: AtomicBool::new(false),
        }
    }
}

impl<W: AsyncWrite + Unpin> SocketSlot<W> {
    /// Marks a connection attempt as started.
    ///
    /// Until the attempt installs its socket or ends, a close is held back
    /// instead of failing with [`Error::NotConnected`].
    pub(crate) fn begin_attempt(&self) {
        self.connecting.store(true, Ordering::SeqCst);
    }

    /// Installs a freshly handshaken socket.
    ///
    /// A socket left over from an earlier attempt is dropped, which wakes
    /// its decode loop if one is still running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] once the slot has been retired,
    /// or when a close was requested while the attempt was dialing. The
    /// writer is shut down in both cases.
    pub(crate) async fn install(&self, mut writer: W) -> Result<(ClosedSignal, Generation)> {
        let mut state = self.state.lock().await;
        self.connecting.store(false, Ordering::SeqCst);

        if state.retired || std::mem::take(&mut state.close_requested) {
            debug!("Close requested before install, dropping socket");
            let _ = writer.shutdown().await;
            return Err(Error::ConnectionClosed);
        }

        let generation = state.next_generation;
        state.next_generation += 1;

        let (closed_tx, closed_rx) = oneshot::channel();
        let previous = state.live.replace(LiveSocket {
            writer,
            generation,
            closed_tx,
        });
        if previous.is_some() {
            debug!("Replaced socket from a previous connection");
        }
        Ok((closed_rx, generation))
    }

    /// Writes one complete frame to the current socket and flushes.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no socket is installed
    /// - [`Error::Io`] if the write or flush fails
    pub(crate) async fn write_frame(&self, frame: &[u8]) -> Result<()> {
        let mut state = self.state.lock().await;
        let live = state.live.as_mut().ok_or(Error::NotConnected)?;

        live.writer.write_all(frame).await?;
        live.writer.flush().await?;

        trace!(len = frame.len(), "Frame written");
        Ok(())
    }

    /// Writes one frame only if `generation` is still installed.
    pub(crate) async fn write_frame_to(&self, generation: Generation, frame: &[u8]) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(live) = state.live.as_mut().filter(|l| l.generation == generation) else {
            debug!(generation, "Socket gone, reply frame skipped");
            return Ok(());
        };

        live.writer.write_all(frame).await?;
        live.writer.flush().await?;
        Ok(())
    }

    /// Takes the socket out of the slot and shuts its write side down.
    ///
    /// The socket is cleared before the shutdown is attempted, so it is
    /// gone even when the shutdown fails. While an attempt is still
    /// dialing, the close is recorded and honored by [`install`](Self::install).
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no socket is installed and no attempt is
    ///   in progress
    /// - [`Error::Io`] if the shutdown fails
    pub(crate) async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(live) = state.live.take() else {
            if self.connecting.load(Ordering::SeqCst) {
                debug!("Attempt still dialing, close deferred");
                state.close_requested = true;
                return Ok(());
            }
            return Err(Error::NotConnected);
        };

        live.shutdown().await?;
        debug!("Socket closed");
        Ok(())
    }

    /// Closes the socket only if `generation` is still installed.
    pub(crate) async fn close_generation(&self, generation: Generation) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.live.as_ref().is_none_or(|l| l.generation != generation) {
            debug!(generation, "Socket gone, close skipped");
            return Ok(());
        }

        if let Some(live) = state.live.take() {
            live.shutdown().await?;
            debug!(generation, "Socket closed");
        }
        Ok(())
    }

    /// Ends an attempt without reporting anything.
    ///
    /// Drops the attempt's socket if it is still installed and forgets any
    /// deferred close.
    pub(crate) async fn clear(&self, generation: Option<Generation>) {
        let mut state = self.state.lock().await;
        self.connecting.store(false, Ordering::SeqCst);
        state.close_requested = false;

        let current = state.live.as_ref().map(|l| l.generation);
        if generation.is_some() && current == generation
            && let Some(live) = state.live.take()
        {
            let _ = live.shutdown().await;
            debug!(?generation, "Socket cleared after failed attempt");
        }
    }

    /// Closes any live socket and refuses future installs.
    pub(crate) async fn retire(&self) {
        let mut state = self.state.lock().await;
        state.retired = true;

        if let Some(live) = state.live.take() {
            let _ = live.shutdown().await;
            debug!("Socket closed on teardown");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, DuplexStream, duplex};

    #[tokio::test]
    async fn test_write_without_socket_is_not_connected() {
        let slot = SocketSlot::<DuplexStream>::default();
        let err = slot.write_frame(b"frame").await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
        assert!(matches!(slot.close().await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_write_then_close_then_write() {
        let (client, mut server) = duplex(64);
        let slot = SocketSlot::default();
        let (mut closed, _) = slot.install(client).await.unwrap();

        slot.write_frame(b"abc").await.unwrap();
        let mut buf = [0u8; 3];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"abc");

        slot.close().await.unwrap();
        assert!((&mut closed).await.is_ok());
        assert!(matches!(slot.write_frame(b"late").await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_install_replaces_previous_socket() {
        let (first, _first_peer) = duplex(64);
        let (second, _second_peer) = duplex(64);
        let slot = SocketSlot::default();

        let (old_closed, old_generation) = slot.install(first).await.unwrap();
        let (_new_closed, new_generation) = slot.install(second).await.unwrap();

        // Sender dropped without firing.
        assert!(old_closed.await.is_err());
        assert_ne!(old_generation, new_generation);
    }

    #[tokio::test]
    async fn test_retire_refuses_install() {
        let (client, _peer) = duplex(64);
        let slot = SocketSlot::default();
        let (closed, _) = slot.install(client).await.unwrap();

        slot.retire().await;
        assert!(closed.await.is_ok());

        let (late, _late_peer) = duplex(64);
        assert!(matches!(slot.install(late).await, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_close_while_dialing_is_honored_by_install() {
        let slot = SocketSlot::default();
        slot.begin_attempt();

        slot.close().await.unwrap();

        let (client, mut server) = duplex(64);
        assert!(matches!(slot.install(client).await, Err(Error::ConnectionClosed)));

        let mut rest = Vec::new();
        server.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        assert!(matches!(slot.close().await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_clear_drops_socket_silently() {
        let (client, mut server) = duplex(64);
        let slot = SocketSlot::default();
        slot.begin_attempt();
        let (closed, generation) = slot.install(client).await.unwrap();

        slot.clear(Some(generation)).await;

        assert!(closed.await.is_ok());
        let mut rest = Vec::new();
        server.read_to_end(&mut rest).await.unwrap();
        assert!(matches!(slot.write_frame(b"late").await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_clear_after_failed_dial_forgets_deferred_close() {
        let slot = SocketSlot::<DuplexStream>::default();
        slot.begin_attempt();
        slot.close().await.unwrap();

        slot.clear(None).await;

        assert!(matches!(slot.close().await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_stale_generation_frames_are_skipped() {
        let (first, _first_peer) = duplex(64);
        let (second, mut second_peer) = duplex(64);
        let slot = SocketSlot::default();

        let (_, stale) = slot.install(first).await.unwrap();
        let (_, current) = slot.install(second).await.unwrap();

        slot.write_frame_to(stale, b"old").await.unwrap();
        slot.close_generation(stale).await.unwrap();
        slot.write_frame_to(current, b"new").await.unwrap();

        let mut buf = [0u8; 3];
        second_peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"new");

        slot.close_generation(current).await.unwrap();
        assert!(matches!(slot.write_frame(b"x").await, Err(Error::NotConnected)));
    }
}
