//! The per-event dispatch state machine.
//!
//! ```text
//! Received ─┬─> FilteredOut
//!           └─> Normalized ─┬─> PlatformUnsupported
//!                           └─> Resolved ─┬─> Existing   (lookup hit or create conflict)
//!                                         └─> Created
//! any stage ──> Failed (DispatchError)
//! ```
//!
//! At most one job exists per `(reference, platform)` because the job name
//! is the deterministic fingerprint and the platform's create call rejects
//! duplicates atomically. The lookup before create is an optimisation that
//! avoids a doomed create; it is not what provides the guarantee, so two
//! dispatches for the same artifact may run concurrently.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use pipeline::{
    is_relevant, is_supported, label_keys, normalize, platform, DispatchError, DispatchOutcome,
    DispatchStage, ExistingVia, Fingerprint, JobSpecBuilder, JobStore, JobStoreError, LabelSet,
    PlatformLookup, RawNotification, RegistryEvent,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Default bound for each blocking call made during a dispatch.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the dispatch state machine for one event at a time.
///
/// Cheap to share: wrap in an [`Arc`] and hand the same instance to every
/// worker.
pub struct Dispatcher {
    builder: JobSpecBuilder,
    jobs: Arc<dyn JobStore>,
    lookup: Arc<dyn PlatformLookup>,
    call_timeout: Duration,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("builder", &self.builder)
            .field("jobs", &"JobStore")
            .field("lookup", &"PlatformLookup")
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl Dispatcher {
    /// Creates a dispatcher with [`DEFAULT_CALL_TIMEOUT`].
    pub fn new(
        builder: JobSpecBuilder,
        jobs: Arc<dyn JobStore>,
        lookup: Arc<dyn PlatformLookup>,
    ) -> Self {
        Self {
            builder,
            jobs,
            lookup,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Overrides the per-call time bound.
    #[must_use]
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Filters, normalises and dispatches one raw notification.
    pub async fn dispatch_notification(
        &self,
        notification: &RawNotification,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome, DispatchError> {
        if !is_relevant(notification) {
            return Ok(DispatchOutcome::FilteredOut);
        }
        let event = normalize(notification)?;
        self.dispatch(&event, cancel).await
    }

    /// Dispatches one normalised event.
    ///
    /// Cancelling `cancel` aborts whichever blocking call is in flight and
    /// returns [`DispatchError::Cancelled`].
    #[instrument(
        name = "dispatch_event",
        skip_all,
        fields(
            registry = %event.registry(),
            repository = %event.repository(),
            tag = %event.tag(),
            digest = %event.digest(),
        )
    )]
    pub async fn dispatch(
        &self,
        event: &RegistryEvent,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome, DispatchError> {
        let platform = self
            .bounded(
                DispatchStage::PlatformLookup,
                cancel,
                platform::resolve(
                    event,
                    self.lookup.as_ref(),
                    self.builder.insecure_registry(),
                ),
            )
            .await??;

        if !is_supported(&platform) {
            info!(%platform, "skipping unsupported platform");
            return Ok(DispatchOutcome::PlatformUnsupported { platform });
        }

        let name = Fingerprint::derive(event, &platform);
        let selector = LabelSet::derive(event, &platform);

        let existing = self
            .bounded(
                DispatchStage::ListJobs,
                cancel,
                self.jobs.list_jobs(self.builder.namespace(), &selector),
            )
            .await?
            .map_err(DispatchError::PlatformList)?;

        // Truncated label values can match a different artifact, so a hit
        // only counts when it carries this fingerprint.
        let fingerprint = name.as_str();
        if let Some(job) = existing.iter().find(|job| {
            job.name == fingerprint
                || job.labels.get(label_keys::FINGERPRINT).map(String::as_str) == Some(fingerprint)
        }) {
            debug!(job = %job.name, matches = existing.len(), "scan job already exists");
            return Ok(DispatchOutcome::Existing {
                name,
                via: ExistingVia::Lookup,
            });
        }
        if !existing.is_empty() {
            debug!(
                matches = existing.len(),
                "selector matched jobs for other artifacts; creating"
            );
        }

        let spec = self.builder.build(event, &platform);
        info!(job = %name, %platform, "creating scan job");
        match self
            .bounded(DispatchStage::CreateJob, cancel, self.jobs.create_job(&spec))
            .await?
        {
            Ok(()) => Ok(DispatchOutcome::Created { name }),
            Err(JobStoreError::AlreadyExists { .. }) => {
                debug!(job = %name, "lost create race to a concurrent dispatch");
                Ok(DispatchOutcome::Existing {
                    name,
                    via: ExistingVia::CreateConflict,
                })
            }
            Err(source) => Err(DispatchError::PlatformCreate {
                name: name.to_string(),
                source,
            }),
        }
    }

    /// Runs `call` under the per-call timeout and the caller's cancellation.
    async fn bounded<F>(
        &self,
        stage: DispatchStage,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<F::Output, DispatchError>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(DispatchError::Cancelled { stage }),
            res = tokio::time::timeout(self.call_timeout, call) => {
                res.map_err(|_| DispatchError::TimedOut { stage, after: self.call_timeout })
            }
        }
    }
}
