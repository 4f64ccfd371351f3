//! Port traits for the collaborators the dispatcher depends on.
//!
//! Infrastructure crates implement these; the domain never sees transport
//! details. Both traits are dyn-compatible so the composition root can inject
//! `Arc<dyn JobStore>` and `Arc<dyn PlatformLookup>`.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::{JobStoreError, LabelSet, Namespace, Platform, RegistryLookupError, ScanJobSpec};

/// A job that already exists on the orchestration platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRef {
    /// Object name.
    pub name: String,
    /// Labels currently attached to the job.
    pub labels: BTreeMap<String, String>,
}

/// The slice of the orchestration platform API the dispatcher needs.
///
/// Implementations must make [`JobStore::create_job`] atomic with respect to
/// the job name: creating a name that already exists fails with
/// [`JobStoreError::AlreadyExists`] and leaves the existing object untouched.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Lists jobs in `namespace` whose labels include every label in `selector`.
    ///
    /// Implementations may encode label values for their own label syntax,
    /// as long as create and list use the same encoding.
    async fn list_jobs(
        &self,
        namespace: &Namespace,
        selector: &LabelSet,
    ) -> Result<Vec<JobRef>, JobStoreError>;

    /// Creates the job described by `spec` in `spec.namespace()`.
    async fn create_job(&self, spec: &ScanJobSpec) -> Result<(), JobStoreError>;
}

/// Resolves the platform of an image reference by reading its metadata from
/// the registry.
#[async_trait]
pub trait PlatformLookup: Send + Sync {
    /// `insecure_tls` disables certificate verification against the registry.
    async fn resolve_platform(
        &self,
        reference: &str,
        insecure_tls: bool,
    ) -> Result<Platform, RegistryLookupError>;
}
