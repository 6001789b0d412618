//! Serialized executor for socket writes and closes.
//!
//! One dispatch task per client drains an unbounded channel in submission
//! order, running exactly one task at a time. Callers only enqueue, so
//! `send` and `disconnect` never wait on the network.
//!
//! Replies the decode loop queues for itself (pongs, the close echo) carry
//! the generation of the socket they answer and never touch a later one.
//! Their failures are logged, not reported.
//!
//! # Teardown
//!
//! The queue lives as long as its [`DispatchQueue`]. Dropping it closes the
//! channel; the task finishes the tasks already queued, then retires the
//! socket slot, closing any live socket so the decode loop ends too.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::callback::SocketCallback;
use crate::error::Result;

use super::socket::{Generation, SocketSlot};

// ============================================================================
// DispatchTask
// ============================================================================

/// One deferred socket operation.
pub(crate) enum DispatchTask {
    /// Write one complete frame.
    Write(Vec<u8>),
    /// Close the socket.
    Close,
    /// Write one frame to the socket of the given generation only.
    Reply(Generation, Vec<u8>),
    /// Close the socket of the given generation only.
    CloseGeneration(Generation),
}

impl fmt::Debug for DispatchTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Write(frame) => write!(f, "Write({} bytes)", frame.len()),
            Self::Close => f.write_str("Close"),
            Self::Reply(generation, frame) => {
                write!(f, "Reply({generation}, {} bytes)", frame.len())
            }
            Self::CloseGeneration(generation) => write!(f, "CloseGeneration({generation})"),
        }
    }
}

// ============================================================================
// DispatchQueue
// ============================================================================

/// Owning handle to the dispatch task.
pub(crate) struct DispatchQueue {
    task_tx: mpsc::UnboundedSender<DispatchTask>,
}

impl DispatchQueue {
    /// Spawns the dispatch task on `runtime`.
    pub(crate) fn spawn(
        runtime: &Handle,
        socket: Arc<SocketSlot>,
        callback: Arc<dyn SocketCallback>,
    ) -> Self {
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        runtime.spawn(run_dispatch_loop(task_rx, socket, callback));
        Self { task_tx }
    }

    /// Enqueues a task.
    pub(crate) fn enqueue(&self, task: DispatchTask) {
        trace!(?task, "Task enqueued");
        if self.task_tx.send(task).is_err() {
            warn!("Dispatch task is gone, task dropped");
        }
    }

    /// Returns a handle that does not keep the queue alive.
    pub(crate) fn downgrade(&self) -> WeakDispatcher {
        WeakDispatcher {
            task_tx: self.task_tx.downgrade(),
        }
    }
}

// ============================================================================
// WeakDispatcher
// ============================================================================

/// Enqueue handle held by the connect task.
///
/// Holding it does not delay teardown; tasks enqueued after teardown are
/// dropped.
#[derive(Clone)]
pub(crate) struct WeakDispatcher {
    task_tx: mpsc::WeakUnboundedSender<DispatchTask>,
}

impl WeakDispatcher {
    /// Enqueues a task if the queue still exists.
    pub(crate) fn enqueue(&self, task: DispatchTask) {
        match self.task_tx.upgrade() {
            Some(task_tx) => {
                trace!(?task, "Task enqueued");
                let _ = task_tx.send(task);
            }
            None => debug!(?task, "Dispatch queue torn down, task dropped"),
        }
    }
}

// ============================================================================
// Dispatch Loop
// ============================================================================

/// Runs tasks in order until the queue is dropped, then retires the socket.
async fn run_dispatch_loop<W>(
    mut task_rx: mpsc::UnboundedReceiver<DispatchTask>,
    socket: Arc<SocketSlot<W>>,
    callback: Arc<dyn SocketCallback>,
) where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(task) = task_rx.recv().await {
        match task {
            DispatchTask::Write(frame) => report(&*callback, socket.write_frame(&frame).await),
            DispatchTask::Close => report(&*callback, socket.close().await),
            DispatchTask::Reply(generation, frame) => {
                if let Err(e) = socket.write_frame_to(generation, &frame).await {
                    debug!(generation, error = %e, "Reply frame failed");
                }
            }
            DispatchTask::CloseGeneration(generation) => {
                if let Err(e) = socket.close_generation(generation).await {
                    debug!(generation, error = %e, "Reply close failed");
                }
            }
        }
    }

    socket.retire().await;
    debug!("Dispatch loop terminated");
}

fn report(callback: &dyn SocketCallback, result: Result<()>) {
    if let Err(e) = result {
        debug!(error = %e, "Dispatch task failed");
        callback.on_error(e);
    }
}

// ============================================================================
// Tests
// ============================================================================
