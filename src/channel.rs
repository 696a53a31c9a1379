//! Cross-thread plumbing between the background worker and the foreground driver.

use crate::provider::StreamEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// Create an unbounded FIFO event queue.
pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        EventSender { tx },
        EventReceiver {
            rx,
            closed: false,
        },
    )
}

#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl EventSender {
    /// Enqueue an event. Never blocks; events sent after the receiver is gone are dropped.
    pub fn put(&self, ev: StreamEvent) {
        if self.tx.send(ev).is_err() {
            tracing::debug!("event receiver dropped; discarding event");
        }
    }
}

#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<StreamEvent>,
    closed: bool,
}

impl EventReceiver {
    /// Take the next queued event without blocking.
    pub fn try_take(&mut self) -> Option<StreamEvent> {
        match self.rx.try_recv() {
            Ok(ev) => Some(ev),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                None
            }
        }
    }

    /// True once the queue is drained and every sender has been dropped.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Advisory cancellation shared between the driver and one worker.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
