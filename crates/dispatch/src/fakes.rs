//! In-memory port implementations for tests.
//!
//! Enabled outside this crate with the `test-util` feature.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use pipeline::{
    JobRef, JobStore, JobStoreError, LabelSet, Namespace, Platform, PlatformLookup,
    RegistryLookupError, ScanJobSpec,
};

/// Job store with the platform's atomic create-or-conflict semantics.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<BTreeMap<String, ScanJobSpec>>,
    hide_from_list: bool,
    fail_lists: bool,
    failing_creates: AtomicU32,
    create_calls: AtomicUsize,
    list_calls: AtomicUsize,
}

impl InMemoryJobStore {
    /// Lists always come back empty, forcing every dispatch to attempt a create.
    pub fn hiding_jobs_from_list(mut self) -> Self {
        self.hide_from_list = true;
        self
    }

    /// Every list call fails.
    pub fn failing_lists(mut self) -> Self {
        self.fail_lists = true;
        self
    }

    /// The next `n` create calls fail with a transient error.
    pub fn failing_creates(self, n: u32) -> Self {
        self.failing_creates.store(n, Ordering::SeqCst);
        self
    }

    pub fn jobs(&self) -> Vec<ScanJobSpec> {
        self.store().values().cloned().collect()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn store(&self) -> MutexGuard<'_, BTreeMap<String, ScanJobSpec>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn list_jobs(
        &self,
        namespace: &Namespace,
        selector: &LabelSet,
    ) -> Result<Vec<JobRef>, JobStoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_lists {
            return Err(JobStoreError::Unavailable {
                message: "list refused".into(),
            });
        }
        if self.hide_from_list {
            return Ok(Vec::new());
        }
        Ok(self
            .store()
            .values()
            .filter(|spec| spec.namespace() == namespace)
            .filter(|spec| selector.is_subset_of(spec.labels().as_map()))
            .map(|spec| JobRef {
                name: spec.name().to_string(),
                labels: spec.labels().as_map().clone(),
            })
            .collect())
    }

    async fn create_job(&self, spec: &ScanJobSpec) -> Result<(), JobStoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let remaining_failures = self.failing_creates.load(Ordering::SeqCst);
        if remaining_failures > 0 {
            self.failing_creates.store(remaining_failures - 1, Ordering::SeqCst);
            return Err(JobStoreError::Unavailable {
                message: "apiserver unavailable".into(),
            });
        }

        let mut jobs = self.store();
        let name = spec.name().to_string();
        if jobs.contains_key(&name) {
            return Err(JobStoreError::AlreadyExists { name });
        }
        jobs.insert(name, spec.clone());
        Ok(())
    }
}

/// Lookup that always returns the same answer.
#[derive(Debug)]
pub struct StaticLookup(Result<Platform, RegistryLookupError>);

impl StaticLookup {
    pub fn platform(platform: Platform) -> Self {
        Self(Ok(platform))
    }

    pub fn failing(err: RegistryLookupError) -> Self {
        Self(Err(err))
    }
}

#[async_trait]
impl PlatformLookup for StaticLookup {
    async fn resolve_platform(
        &self,
        _reference: &str,
        _insecure_tls: bool,
    ) -> Result<Platform, RegistryLookupError> {
        self.0.clone()
    }
}

/// Lookup that never completes.
#[derive(Debug)]
pub struct PendingLookup;

#[async_trait]
impl PlatformLookup for PendingLookup {
    async fn resolve_platform(
        &self,
        _reference: &str,
        _insecure_tls: bool,
    ) -> Result<Platform, RegistryLookupError> {
        std::future::pending().await
    }
}
