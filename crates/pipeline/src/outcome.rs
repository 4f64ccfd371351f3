//! Terminal states of a successful dispatch.
//!
//! Failures are [`crate::DispatchError`]; everything here is success from
//! the caller's point of view, including "nothing to do".

use crate::{Fingerprint, Platform};

/// Why an existing job was found instead of a new one being created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingVia {
    /// The label or name lookup found a job before create was attempted.
    Lookup,
    /// Create reported "already exists": a concurrent dispatch won the race.
    CreateConflict,
}

/// How a dispatch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The notification was not a manifest push.
    FilteredOut,
    /// The image targets a platform the scanner does not support.
    PlatformUnsupported {
        platform: Platform,
    },
    /// A job for this artifact already exists; nothing was created.
    Existing {
        name: Fingerprint,
        via: ExistingVia,
    },
    /// A new job was created.
    Created {
        name: Fingerprint,
    },
}

impl DispatchOutcome {
    /// Short, stable label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FilteredOut => "filtered_out",
            Self::PlatformUnsupported { .. } => "platform_unsupported",
            Self::Existing { .. } => "existing",
            Self::Created { .. } => "created",
        }
    }
}
