//! Multi-producer, single-consumer FIFO of scan events.
//!
//! Backed by an unbounded tokio channel: producers never wait on the
//! consumer, and the queue itself never drops an event. Depth is not bounded,
//! so a stalled dispatcher lets the queue grow without limit.

use thiserror::Error;
use tokio::sync::mpsc;

use super::event::ScanEvent;

/// Returned when enqueueing after the consumer has gone away.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event queue consumer has stopped; {kind} event was not queued")]
pub struct QueueClosed {
    pub kind: &'static str,
}

/// Producer handle. Cheap to clone; one per request handler is fine.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<ScanEvent>,
}

/// Consumer handle. Exactly one exists per queue.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<ScanEvent>,
}

/// Create a new event queue.
pub fn event_queue() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx })
}

impl EventSender {
    /// Append an event. Never blocks.
    ///
    /// Only fails once the receiver has been dropped, i.e. after the
    /// dispatcher has terminated.
    pub fn enqueue(&self, event: impl Into<ScanEvent>) -> Result<(), QueueClosed> {
        let event = event.into();
        let kind = event.kind();
        self.tx.send(event).map_err(|_| QueueClosed { kind })
    }

    /// Whether the consumer side is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl EventReceiver {
    /// Wait for the next event in enqueue order.
    ///
    /// Returns `None` once every sender has been dropped and the queue is
    /// empty.
    pub async fn dequeue(&mut self) -> Option<ScanEvent> {
        self.rx.recv().await
    }

    /// Number of events waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
