//! Bounded event channel between ingestion and dispatch.
//!
//! Producers wait for capacity instead of dropping events, so a slow
//! orchestration platform pushes back on the webhook sender.

use pipeline::QueuedEvent;
use thiserror::Error;
use tokio::sync::mpsc;

/// Default number of events buffered between ingestion and dispatch.
pub const DEFAULT_QUEUE_CAPACITY: usize = 128;

/// Returned when every receiver has shut down; carries the undelivered event.
#[derive(Debug, Error)]
#[error("event queue is closed")]
pub struct QueueClosed(pub QueuedEvent);

/// Producer half. Cloneable; one clone per producer.
#[derive(Debug, Clone)]
pub struct EventSender(mpsc::Sender<QueuedEvent>);

impl EventSender {
    /// Waits for capacity, then enqueues `event`.
    pub async fn enqueue(&self, event: QueuedEvent) -> Result<(), QueueClosed> {
        self.0.send(event).await.map_err(|e| QueueClosed(e.0))
    }

    /// Returns `true` once the consumer side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

/// Consumer half, owned by the worker pool.
#[derive(Debug)]
pub struct EventReceiver(pub(crate) mpsc::Receiver<QueuedEvent>);

impl EventReceiver {
    /// Receives the next event; `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<QueuedEvent> {
        self.0.recv().await
    }

    /// Closes the queue and returns the events still buffered in it.
    ///
    /// Later enqueues fail with [`QueueClosed`].
    pub fn drain(&mut self) -> Vec<QueuedEvent> {
        self.0.close();
        std::iter::from_fn(|| self.0.try_recv().ok()).collect()
    }
}

/// Creates a bounded queue holding at most `capacity` events.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn event_queue(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender(tx), EventReceiver(rx))
}
