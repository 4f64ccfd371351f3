//! Core dispatch domain for regscan.
//!
//! This crate contains every domain concept used to turn a registry push
//! notification into at most one vulnerability-scan job: the canonical
//! [`RegistryEvent`], the relevance filter and normaliser, the deterministic
//! identity ([`Fingerprint`], [`LabelSet`]), the platform allow-list, the
//! [`ScanJobSpec`] builder, and the port traits infrastructure crates
//! implement.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`Namespace`, `SecretName`, `DeliveryId`) |
//! | [`types`] | Shared value types (`Platform`, `Timestamp`) |
//! | [`errors`] | Error taxonomy and retry policy |
//! | [`event`] | `RegistryEvent`, `QueuedEvent` |
//! | [`notification`] | Notification envelope, filter, normaliser |
//! | [`identity`] | Fingerprint and label derivation |
//! | [`platform`] | Supported-platform allow-list and resolution |
//! | [`job`] | `ScanJobSpec` and its builder |
//! | [`outcome`] | Terminal dispatch states |
//! | [`ports`] | `JobStore`, `PlatformLookup` |

pub mod errors;
pub mod event;
pub mod identifiers;
pub mod identity;
pub mod job;
pub mod notification;
pub mod outcome;
pub mod platform;
pub mod ports;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use errors::{
    DispatchError, DispatchStage, JobStoreError, MalformedEvent, RegistryLookupError, RetryPolicy,
};
pub use event::{QueuedEvent, RegistryEvent};
pub use identifiers::{DeliveryId, Namespace, SecretName};
pub use identity::{
    fingerprint, label_keys, labels, Fingerprint, LabelSet, MAX_LABEL_VALUE_LENGTH,
    MAX_NAME_LENGTH,
};
pub use job::{EnvBinding, JobSpecBuilder, RestartPolicy, ScanContainer, ScanJobSpec};
pub use notification::{
    filter_notifications, is_relevant, normalize, Action, Envelope, RawNotification, Target,
    MANIFEST_MEDIA_TYPES,
};
pub use outcome::{DispatchOutcome, ExistingVia};
pub use platform::{is_supported, SupportedPlatform, SUPPORTED_PLATFORMS};
pub use ports::{JobRef, JobStore, PlatformLookup};
pub use types::{Platform, Timestamp};
