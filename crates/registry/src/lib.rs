//! regscan registry infrastructure adapter.
//!
//! Implements [`pipeline::PlatformLookup`] by pulling an image's manifest and
//! config blob with [`oci_client`].
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Endpoint selection (plain HTTP for loopback
//! registries), the TLS mode and the mapping of client errors onto
//! [`pipeline::RegistryLookupError`] live here. Reference parsing, anonymous
//! token exchange and index traversal are left to [`oci_client`]. The
//! [`pipeline`] crate only sees a [`pipeline::Platform`] or a lookup error.

pub mod client;

pub use client::RegistryClient;
