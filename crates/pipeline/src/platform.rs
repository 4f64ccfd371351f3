//! Platform resolution and the supported-platform allow-list.
//!
//! The allow-list is data, not branching: [`SUPPORTED_PLATFORMS`] is the
//! whole policy and [`is_supported`] only interprets it.

use crate::{Platform, PlatformLookup, RegistryEvent, RegistryLookupError};

/// One allow-list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedPlatform {
    pub os: &'static str,
    pub architecture: &'static str,
    pub variant: Option<&'static str>,
}

const fn linux(architecture: &'static str, variant: Option<&'static str>) -> SupportedPlatform {
    SupportedPlatform {
        os: "linux",
        architecture,
        variant,
    }
}

/// Platforms the scanner can analyse.
pub const SUPPORTED_PLATFORMS: &[SupportedPlatform] = &[
    linux("amd64", None),
    linux("arm64", None),
    linux("arm", Some("v7")),
    linux("arm", Some("v6")),
    linux("riscv64", None),
    linux("ppc64le", None),
    linux("s390x", None),
    linux("386", None),
];

impl SupportedPlatform {
    /// OS and architecture must match exactly. A variant is compared only
    /// when both the entry and the platform carry one, since image configs
    /// frequently omit it.
    pub fn matches(&self, platform: &Platform) -> bool {
        self.os == platform.os
            && self.architecture == platform.architecture
            && match (self.variant, platform.variant.as_deref()) {
                (Some(expected), Some(actual)) => expected == actual,
                _ => true,
            }
    }
}

/// Returns `true` if any allow-list entry matches `platform`.
pub fn is_supported(platform: &Platform) -> bool {
    SUPPORTED_PLATFORMS.iter().any(|p| p.matches(platform))
}

/// Returns the platform carried by the event, falling back to a registry
/// lookup of the event's reference.
pub async fn resolve(
    event: &RegistryEvent,
    lookup: &dyn PlatformLookup,
    insecure_tls: bool,
) -> Result<Platform, RegistryLookupError> {
    match event.platform() {
        Some(platform) => Ok(platform.clone()),
        None => lookup.resolve_platform(&event.reference(), insecure_tls).await,
    }
}
