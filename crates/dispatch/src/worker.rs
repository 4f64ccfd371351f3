//! Worker pool draining the event queue.
//!
//! Workers share one receiver and run the [`Dispatcher`] independently per
//! event. There is no per-fingerprint lock: concurrent dispatches of the same
//! artifact are made safe by the dispatcher itself.
//!
//! Retryable failures are redelivered through the same queue after an
//! exponential back-off until the attempt ceiling is reached.

use std::sync::Arc;
use std::time::Duration;

use pipeline::{DispatchError, QueuedEvent, RetryPolicy};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{Dispatcher, EventReceiver, EventSender};

/// Tuning for the worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Number of concurrent dispatch workers.
    pub workers: usize,
    /// Total dispatch attempts per event, including the first.
    pub max_attempts: u32,
    /// Delay before the first redelivery; doubles per attempt.
    pub base_backoff: Duration,
    /// Upper bound on the redelivery delay.
    pub max_backoff: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 5,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl WorkerPoolConfig {
    /// Delay before redelivering an event that has failed `attempt + 1` times.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Handle to the running workers.
#[derive(Debug)]
pub struct WorkerPool {
    tasks: JoinSet<()>,
}

impl WorkerPool {
    /// Spawns `config.workers` workers on the current runtime.
    ///
    /// `requeue` is a sender for the same queue `receiver` drains; it carries
    /// redeliveries. Workers exit when `cancel` fires or the queue closes.
    pub fn spawn(
        dispatcher: Arc<Dispatcher>,
        receiver: EventReceiver,
        requeue: EventSender,
        config: WorkerPoolConfig,
        cancel: CancellationToken,
    ) -> Self {
        let receiver = Arc::new(Mutex::new(receiver));
        let config = Arc::new(config);
        let mut tasks = JoinSet::new();

        for worker in 0..config.workers.max(1) {
            let worker_ctx = Worker {
                dispatcher: dispatcher.clone(),
                receiver: receiver.clone(),
                requeue: requeue.clone(),
                config: config.clone(),
                cancel: cancel.clone(),
            };
            tasks.spawn(
                worker_ctx
                    .run()
                    .instrument(info_span!("dispatch_worker", worker)),
            );
        }

        info!(workers = config.workers.max(1), "dispatch workers started");
        Self { tasks }
    }

    /// Waits for every worker to exit.
    pub async fn join(mut self) {
        while let Some(res) = self.tasks.join_next().await {
            if let Err(e) = res {
                error!(error = %e, "dispatch worker terminated abnormally");
            }
        }
    }
}

struct Worker {
    dispatcher: Arc<Dispatcher>,
    receiver: Arc<Mutex<EventReceiver>>,
    requeue: EventSender,
    config: Arc<WorkerPoolConfig>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) {
        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    self.abandon_queued().await;
                    break;
                }
                next = async { self.receiver.lock().await.recv().await } => next,
            };
            let Some(queued) = next else {
                break;
            };

            let span = info_span!(
                "delivery",
                delivery_id = %queued.delivery_id,
                attempt = queued.attempt,
            );
            self.process(queued).instrument(span).await;
        }
        debug!("dispatch worker stopped");
    }

    /// Events still queued at shutdown were already acknowledged to the
    /// registry, so each one is logged before it is dropped.
    async fn abandon_queued(&self) {
        for queued in self.receiver.lock().await.drain() {
            warn!(
                delivery_id = %queued.delivery_id,
                reference = %queued.event.reference(),
                "shutdown before dispatch; event abandoned"
            );
        }
    }

    async fn process(&self, queued: QueuedEvent) {
        match self.dispatcher.dispatch(&queued.event, &self.cancel).await {
            Ok(outcome) => {
                info!(
                    outcome = outcome.as_str(),
                    reference = %queued.event.reference(),
                    "dispatch finished"
                );
            }
            Err(err) => self.handle_failure(queued, err),
        }
    }

    fn handle_failure(&self, queued: QueuedEvent, err: DispatchError) {
        let reference = queued.event.reference();
        let after = match err.retry_policy() {
            RetryPolicy::NonRetryable => {
                error!(error = %err, %reference, "dispatch failed; dropping event");
                return;
            }
            RetryPolicy::Retryable { after } => after,
        };

        let attempts = queued.attempt.saturating_add(1);
        if attempts >= self.config.max_attempts {
            error!(error = %err, %reference, attempts, "dispatch failed; attempts exhausted");
            return;
        }

        let delay = after.unwrap_or_else(|| self.config.backoff(queued.attempt));
        warn!(error = %err, %reference, ?delay, "dispatch failed; scheduling redelivery");

        let requeue = self.requeue.clone();
        let cancel = self.cancel.clone();
        let next = queued.next_attempt();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {
                    warn!(delivery_id = %next.delivery_id, "shutdown before redelivery");
                }
                () = tokio::time::sleep(delay) => {
                    if let Err(closed) = requeue.enqueue(next).await {
                        warn!(delivery_id = %closed.0.delivery_id, "queue closed before redelivery");
                    }
                }
            }
        });
    }
}
