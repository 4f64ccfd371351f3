//! Deterministic identity for an `(artifact, platform)` pair.
//!
//! The [`Fingerprint`] becomes the job name, and the [`LabelSet`] is attached
//! to the job and used as the lookup selector. Both are pure functions of the
//! event and platform: no salt, no clock, no process state. Restarting the
//! process or running several replicas yields the same identity for the same
//! artifact, which is what makes create-if-absent safe without a lock.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::{Platform, RegistryEvent};

/// Longest object name the orchestration platform accepts for a job.
pub const MAX_NAME_LENGTH: usize = 63;

/// Longest value the orchestration platform accepts for a label.
pub const MAX_LABEL_VALUE_LENGTH: usize = 63;

/// Label keys. The set is fixed; only values vary per artifact.
pub mod label_keys {
    pub const DIGEST: &str = "digest";
    pub const TAG: &str = "tag";
    pub const REGISTRY: &str = "registry";
    pub const REPOSITORY: &str = "repository";
    pub const PLATFORM: &str = "platform";
    /// Attached to created jobs only; never part of the lookup selector.
    pub const FINGERPRINT: &str = "fingerprint";
}

// ---------------------------------------------------------------------------
// Fingerprint
// ---------------------------------------------------------------------------

/// Truncated SHA-256 over every component of the artifact reference and its
/// platform. Lowercase hex, so it is always a valid object name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Derives the fingerprint for `event` running on `platform`.
    pub fn derive(event: &RegistryEvent, platform: &Platform) -> Self {
        let mut hasher = Sha256::new();
        for part in [
            event.registry(),
            event.repository(),
            event.tag(),
            event.digest(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update(b"|");
        }
        hasher.update(platform.to_string().as_bytes());

        let mut hex = format!("{:x}", hasher.finalize());
        hex.truncate(MAX_NAME_LENGTH);
        Self(hex)
    }

    /// Returns the fingerprint as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shorthand for [`Fingerprint::derive`].
pub fn fingerprint(event: &RegistryEvent, platform: &Platform) -> Fingerprint {
    Fingerprint::derive(event, platform)
}

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// Sanitised label values keyed by the fixed [`label_keys`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    /// Derives the lookup labels for `event` running on `platform`.
    ///
    /// `:` (in digests and registry ports) and other characters outside the
    /// label alphabet are replaced by `_` before truncation.
    pub fn derive(event: &RegistryEvent, platform: &Platform) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(label_keys::DIGEST.to_string(), sanitize(event.digest()));
        labels.insert(label_keys::TAG.to_string(), sanitize(event.tag()));
        labels.insert(label_keys::REGISTRY.to_string(), sanitize(event.registry()));
        labels.insert(label_keys::REPOSITORY.to_string(), sanitize(event.repository()));
        let platform_value = platform.components().collect::<Vec<_>>().join("_");
        labels.insert(label_keys::PLATFORM.to_string(), sanitize(&platform_value));
        Self(labels)
    }

    /// Returns a copy that also carries the fingerprint label.
    #[must_use]
    pub fn with_fingerprint(&self, fingerprint: &Fingerprint) -> Self {
        let mut labels = self.0.clone();
        labels.insert(
            label_keys::FINGERPRINT.to_string(),
            sanitize(fingerprint.as_str()),
        );
        Self(labels)
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Iterates labels in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the underlying map.
    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    /// Returns `true` if every label in this set is present with the same
    /// value in `labels`.
    pub fn is_subset_of(&self, labels: &BTreeMap<String, String>) -> bool {
        self.0.iter().all(|(k, v)| labels.get(k) == Some(v))
    }
}

/// Shorthand for [`LabelSet::derive`].
pub fn labels(event: &RegistryEvent, platform: &Platform) -> LabelSet {
    LabelSet::derive(event, platform)
}

fn sanitize(value: &str) -> String {
    let mut out: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/') {
                c
            } else {
                '_'
            }
        })
        .collect();
    // All characters are ASCII at this point, so byte truncation is safe.
    out.truncate(MAX_LABEL_VALUE_LENGTH);
    out.trim_matches(|c: char| !c.is_ascii_alphanumeric()).to_string()
}
