//! Newtype domain identifiers.
//!
//! Configuration names and per-delivery identities are wrapped in distinct
//! newtypes so a [`Namespace`] can never be passed where a [`SecretName`] is
//! expected, even though both are strings underneath.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Creates an identifier from a compile-time constant.
            pub fn from_static(value: &'static str) -> Self {
                debug_assert!(!value.is_empty());
                Self(value.to_string())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed (configuration / cluster names)
// ---------------------------------------------------------------------------

string_id! {
    /// A Kubernetes namespace that scan jobs are placed into.
    ///
    /// Set once at startup from configuration and shared read-only afterwards.
    Namespace
}

string_id! {
    /// Name of the Kubernetes secret holding the scanner credentials.
    ///
    /// Only the name travels through the pipeline; secret values are bound by
    /// reference in the job definition and never read by this process.
    SecretName
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies one accepted notification as it travels through the event queue.
///
/// Generated at ingestion and carried across redeliveries so all log lines
/// for a single notification can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId(Uuid);

impl DeliveryId {
    /// Generates a new random delivery identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
