//! Shared value types for the dispatch domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! structured values that take part in identity derivation and allow-list
//! checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// The operating system and CPU architecture an image was built for.
///
/// Field names follow the OCI descriptor `platform` object so the type can be
/// read straight from a notification target or an image config blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system, e.g. `"linux"`.
    pub os: String,

    /// CPU architecture, e.g. `"amd64"`, `"arm"`.
    pub architecture: String,

    /// Optional CPU variant, e.g. `"v7"` for `linux/arm/v7`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl Platform {
    /// Creates a platform without a CPU variant.
    pub fn new(os: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            architecture: architecture.into(),
            variant: None,
        }
    }

    /// Returns a copy of this platform carrying the given CPU variant.
    ///
    /// An empty variant is normalised to `None`.
    #[must_use]
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        let v = variant.into();
        self.variant = if v.is_empty() { None } else { Some(v) };
        self
    }

    /// Returns the platform components in order, skipping an absent variant.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        [Some(self.os.as_str()), Some(self.architecture.as_str()), self.variant.as_deref()]
            .into_iter()
            .flatten()
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(variant) = &self.variant {
            write!(f, "/{variant}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_display_includes_variant_when_present() {
        assert_eq!(Platform::new("linux", "amd64").to_string(), "linux/amd64");
        assert_eq!(
            Platform::new("linux", "arm").with_variant("v7").to_string(),
            "linux/arm/v7"
        );
    }

    #[test]
    fn empty_variant_is_dropped() {
        assert_eq!(Platform::new("linux", "arm64").with_variant("").variant, None);
    }

    #[test]
    fn platform_reads_oci_descriptor_shape() {
        let p: Platform =
            serde_json::from_str(r#"{"os":"linux","architecture":"arm","variant":"v6"}"#).unwrap();
        assert_eq!(p, Platform::new("linux", "arm").with_variant("v6"));
    }
}
