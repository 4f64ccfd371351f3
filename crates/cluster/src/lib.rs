//! regscan Kubernetes infrastructure adapter.
//!
//! Implements the [`pipeline::JobStore`] port against the `batch/v1` Jobs API
//! using [`kube`].
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules. Object
//! naming, labels and the container command line all come from
//! [`pipeline::ScanJobSpec`]; this crate only translates them to the wire
//! and maps API failures onto [`pipeline::JobStoreError`].

pub mod job_store;
pub mod manifest;

pub use job_store::KubeJobStore;
pub use manifest::{to_job, wire_label_value, wire_selector};
