//! Error and retry-policy types for the dispatch domain.
//!
//! Each collaborator boundary has its own error enum ([`MalformedEvent`] for
//! untrusted notification input, [`RegistryLookupError`] for the
//! [`crate::PlatformLookup`] port, [`JobStoreError`] for the
//! [`crate::JobStore`] port). [`DispatchError`] is what a single dispatch
//! surfaces to its caller.
//!
//! Two conditions that look like failures are deliberately absent:
//! an unsupported platform and an "already exists" create race both end a
//! dispatch successfully (see [`crate::DispatchOutcome`]).
//!
//! [`RetryPolicy`] is a cross-cutting concern: every error that reaches the
//! worker pool decides whether the event is redelivered.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// - `Retryable`: platform API failures, registry connectivity, timeouts,
///   cancellation.
/// - `NonRetryable`: malformed input, references the registry does not know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The event must not be redelivered.
    NonRetryable,
}

impl RetryPolicy {
    /// Returns `true` for [`RetryPolicy::Retryable`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}

// ---------------------------------------------------------------------------
// Boundary errors
// ---------------------------------------------------------------------------

/// A notification that passed the filter but cannot be turned into a
/// [`crate::RegistryEvent`].
///
/// Webhook senders are untrusted, so this is always skip-and-log, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedEvent {
    /// The target URL did not parse.
    #[error("target url '{url}' is not a valid URL: {reason}")]
    InvalidUrl {
        /// The raw URL as received.
        url: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// The target URL parsed but carries no host authority.
    #[error("target url '{url}' has no host")]
    MissingHost {
        /// The raw URL as received.
        url: String,
    },

    /// The registry host is empty.
    #[error("registry host is empty")]
    EmptyRegistry,

    /// The target repository is empty.
    #[error("target repository is empty")]
    EmptyRepository,

    /// Neither a tag nor a digest is present, so no reference can be formed.
    #[error("target carries neither a tag nor a digest")]
    MissingReference,

    /// The digest is not of the form `algorithm:hex`.
    #[error("digest '{digest}' is not in algorithm:hex form")]
    InvalidDigest {
        /// The offending digest string.
        digest: String,
    },
}

/// Failure of the registry metadata lookup used to resolve a platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryLookupError {
    /// The registry could not be reached or answered with a server error.
    #[error("registry '{registry}' unreachable: {message}")]
    Unreachable {
        /// Registry host the request was sent to.
        registry: String,
        /// Transport or status diagnostic.
        message: String,
    },

    /// The registry does not know the reference.
    #[error("reference '{reference}' not found")]
    ReferenceNotFound {
        /// The image reference that was looked up.
        reference: String,
    },

    /// The reference string cannot be split into registry, repository and tag/digest.
    #[error("reference '{reference}' is invalid")]
    InvalidReference {
        /// The image reference that was looked up.
        reference: String,
    },

    /// The registry answered, but with content that is not a usable manifest or config.
    #[error("unexpected registry response for '{reference}': {message}")]
    InvalidResponse {
        /// The image reference that was looked up.
        reference: String,
        /// What was wrong with the response.
        message: String,
    },
}

impl RegistryLookupError {
    /// Only connectivity problems are worth redelivering.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Unreachable { .. } => RetryPolicy::Retryable { after: None },
            Self::ReferenceNotFound { .. }
            | Self::InvalidReference { .. }
            | Self::InvalidResponse { .. } => RetryPolicy::NonRetryable,
        }
    }
}

/// Failure reported by the orchestration platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobStoreError {
    /// An object with the same name already exists. Create calls must report
    /// this atomically; it is how concurrent dispatches are deduplicated.
    #[error("job '{name}' already exists")]
    AlreadyExists {
        /// Name of the conflicting job.
        name: String,
    },

    /// The platform API could not be reached or failed transiently.
    #[error("orchestration platform unavailable: {message}")]
    Unavailable {
        /// Transport or status diagnostic.
        message: String,
    },

    /// The platform refused the request (validation, permissions).
    #[error("orchestration platform rejected the request: {message}")]
    Rejected {
        /// Status diagnostic returned by the platform.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Dispatch errors
// ---------------------------------------------------------------------------

/// The blocking step a dispatch was in when it was cancelled or timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStage {
    /// Registry metadata lookup.
    PlatformLookup,
    /// Listing existing jobs by label selector.
    ListJobs,
    /// Creating the scan job.
    CreateJob,
}

impl std::fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PlatformLookup => "platform lookup",
            Self::ListJobs => "job listing",
            Self::CreateJob => "job creation",
        };
        f.write_str(s)
    }
}

/// Errors surfaced by a single dispatch.
///
/// A failed dispatch never affects other in-flight or queued events.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The notification could not be normalised.
    #[error("malformed event: {0}")]
    Malformed(#[from] MalformedEvent),

    /// Platform resolution through the registry failed.
    #[error("platform lookup failed: {0}")]
    RegistryLookup(#[from] RegistryLookupError),

    /// Listing existing jobs failed.
    #[error("listing existing jobs failed: {0}")]
    PlatformList(#[source] JobStoreError),

    /// Creating the job failed for a reason other than "already exists".
    #[error("creating job '{name}' failed: {source}")]
    PlatformCreate {
        /// Name of the job that was being created.
        name: String,
        /// Platform diagnostic.
        #[source]
        source: JobStoreError,
    },

    /// The caller cancelled the dispatch while it was blocked.
    #[error("dispatch cancelled during {stage}")]
    Cancelled {
        /// Step that was in flight.
        stage: DispatchStage,
    },

    /// A blocking call exceeded its time bound.
    #[error("{stage} timed out after {after:?}")]
    TimedOut {
        /// Step that was in flight.
        stage: DispatchStage,
        /// The bound that was exceeded.
        after: Duration,
    },
}

impl DispatchError {
    /// Returns whether the event should be redelivered.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Malformed(_) => RetryPolicy::NonRetryable,
            Self::RegistryLookup(e) => e.retry_policy(),
            Self::PlatformList(_)
            | Self::PlatformCreate { .. }
            | Self::Cancelled { .. }
            | Self::TimedOut { .. } => RetryPolicy::Retryable { after: None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_input_is_never_retried() {
        let err = DispatchError::from(MalformedEvent::EmptyRepository);
        assert_eq!(err.retry_policy(), RetryPolicy::NonRetryable);
    }

    #[test]
    fn registry_retry_depends_on_cause() {
        let unreachable = DispatchError::from(RegistryLookupError::Unreachable {
            registry: "r.example".into(),
            message: "connection refused".into(),
        });
        assert!(unreachable.retry_policy().is_retryable());

        let missing = DispatchError::from(RegistryLookupError::ReferenceNotFound {
            reference: "r.example/app:v1".into(),
        });
        assert!(!missing.retry_policy().is_retryable());
    }

    #[test]
    fn platform_failures_are_retryable() {
        let create = DispatchError::PlatformCreate {
            name: "abc".into(),
            source: JobStoreError::Rejected {
                message: "forbidden".into(),
            },
        };
        assert!(create.retry_policy().is_retryable());

        let timeout = DispatchError::TimedOut {
            stage: DispatchStage::ListJobs,
            after: Duration::from_secs(1),
        };
        assert!(timeout.retry_policy().is_retryable());
        assert_eq!(timeout.to_string(), "job listing timed out after 1s");
    }
}
