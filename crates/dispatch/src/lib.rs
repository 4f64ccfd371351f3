//! regscan dispatch orchestration.
//!
//! Drives the [`pipeline`] domain against its ports: the [`Dispatcher`] runs
//! the per-event state machine (resolve platform, look up, create), and the
//! [`WorkerPool`] drains the bounded [`event_queue`] that decouples webhook
//! ingestion from dispatch.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Sequences calls between business logic in the
//! [`pipeline`] crate and the [`pipeline::JobStore`] /
//! [`pipeline::PlatformLookup`] ports. Owns time bounds, cancellation and
//! redelivery; contains no domain rules of its own.

pub mod dispatcher;
pub mod queue;
pub mod worker;

#[cfg(any(test, feature = "test-util"))]
pub mod fakes;

pub use dispatcher::{Dispatcher, DEFAULT_CALL_TIMEOUT};
pub use queue::{event_queue, EventReceiver, EventSender, QueueClosed, DEFAULT_QUEUE_CAPACITY};
pub use worker::{WorkerPool, WorkerPoolConfig};
