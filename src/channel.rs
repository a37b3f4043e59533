//! Response Channel
//!
//! FIFO handoff of frames from the command thread to the writer thread.
//!
//! ## Shutdown
//! `shutdown()` marks the channel closed and queues a poison pill behind
//! every frame already enqueued. The writer drains those frames, hits the
//! pill and `dequeue()` returns `None` from then on. No thread is ever
//! cancelled.
//!
//! The closed flag is held while a frame is sent, so a frame is either
//! queued ahead of the pill or rejected. Any number of handles may enqueue.

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::error::{Result, VizError};
use crate::protocol::Frame;

/// What travels through the channel
enum Envelope {
    Frame(Frame),
    /// Poison pill
    Close,
}

/// Unbounded frame queue
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct ResponseChannel {
    sender: Sender<Envelope>,
    receiver: Receiver<Envelope>,
    closed: Arc<Mutex<bool>>,
}

impl ResponseChannel {
    pub fn new() -> Self {
        let (sender, receiver) = channel::unbounded();
        Self {
            sender,
            receiver,
            closed: Arc::new(Mutex::new(false)),
        }
    }

    /// Queue a frame; never blocks
    pub fn enqueue(&self, frame: Frame) -> Result<()> {
        let closed = self.closed.lock();
        if *closed {
            return Err(VizError::ChannelClosed);
        }
        tracing::trace!("Queueing {:?} frame of {} bytes", frame.kind(), frame.len());
        self.sender
            .send(Envelope::Frame(frame))
            .map_err(|_| VizError::ChannelClosed)
    }

    /// Block until a frame arrives; `None` once the channel is shut down
    /// and drained
    pub fn dequeue(&self) -> Option<Frame> {
        if self.is_shut_down() && self.receiver.is_empty() {
            return None;
        }
        match self.receiver.recv() {
            Ok(Envelope::Frame(frame)) => Some(frame),
            Ok(Envelope::Close) | Err(_) => None,
        }
    }

    /// Like `dequeue` but gives up after `timeout`
    ///
    /// `Ok(None)` means the channel is shut down; `Err` means the timeout
    /// expired with nothing queued.
    pub fn dequeue_timeout(&self, timeout: Duration) -> std::result::Result<Option<Frame>, RecvTimeoutError> {
        if self.is_shut_down() && self.receiver.is_empty() {
            return Ok(None);
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(Envelope::Frame(frame)) => Ok(Some(frame)),
            Ok(Envelope::Close) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Close the channel and wake a blocked consumer
    ///
    /// Frames queued before the call are still delivered. Calling it more
    /// than once is harmless.
    pub fn shutdown(&self) {
        let mut closed = self.closed.lock();
        if !*closed {
            *closed = true;
            tracing::debug!("Shutting down response channel ({} queued)", self.len());
            let _ = self.sender.send(Envelope::Close);
        }
    }

    pub fn is_shut_down(&self) -> bool {
        *self.closed.lock()
    }

    /// Items queued, the poison pill included
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl Default for ResponseChannel {
    fn default() -> Self {
        Self::new()
    }
}
