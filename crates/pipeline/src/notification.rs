//! The registry's push-notification envelope and the two boundary adapters
//! that sit on it: the relevance filter and the normaliser.
//!
//! The wire shape is the Docker distribution notification format:
//!
//! ```json
//! { "events": [ { "id": "...", "timestamp": "...", "action": "push",
//!                 "target": { "mediaType": "...", "digest": "...",
//!                             "repository": "...", "url": "...", "tag": "..." },
//!                 "request": { ... } } ] }
//! ```
//!
//! Every field defaults when absent. The filter only inspects `action` and
//! `target.mediaType`; integrity of the rest is the normaliser's job.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{MalformedEvent, Platform, RegistryEvent, Timestamp};

// ---------------------------------------------------------------------------
// Manifest media types
// ---------------------------------------------------------------------------

/// Docker image manifest, schema 2.
pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
/// Docker manifest list (multi-platform).
pub const DOCKER_MANIFEST_LIST_V2: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
/// OCI image manifest.
pub const OCI_IMAGE_MANIFEST_V1: &str = "application/vnd.oci.image.manifest.v1+json";
/// OCI image index (multi-platform).
pub const OCI_IMAGE_INDEX_V1: &str = "application/vnd.oci.image.index.v1+json";

/// Media types that identify an image manifest or manifest list.
///
/// Pushes of anything else (layer blobs, signatures stored as blobs) never
/// produce a scan job.
pub const MANIFEST_MEDIA_TYPES: &[&str] = &[
    DOCKER_MANIFEST_V2,
    DOCKER_MANIFEST_LIST_V2,
    OCI_IMAGE_MANIFEST_V1,
    OCI_IMAGE_INDEX_V1,
];

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// The body of one webhook delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Notifications in the order the registry emitted them.
    #[serde(default)]
    pub events: Vec<RawNotification>,
}

/// What happened to the target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Push,
    Pull,
    Mount,
    Delete,
    /// Any action this process does not know about.
    #[default]
    #[serde(other)]
    Unknown,
}

/// One record of the notification envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawNotification {
    /// Registry-assigned event id.
    pub id: String,
    /// When the registry emitted the event.
    pub timestamp: Option<Timestamp>,
    pub action: Action,
    pub target: Target,
    pub request: RequestRecord,
}

/// The descriptor of the object the action applied to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Target {
    pub media_type: String,
    pub size: u64,
    pub digest: String,
    pub length: u64,
    pub repository: String,
    /// Fully qualified URL of the object; its authority names the registry.
    pub url: String,
    pub tag: String,
    /// Present when the registry (or a proxy in front of it) annotates the
    /// descriptor with the image platform.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

/// The HTTP request that triggered the event, as seen by the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestRecord {
    pub id: String,
    pub addr: String,
    pub host: String,
    pub method: String,
    pub useragent: String,
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Returns `true` for a push of a manifest or manifest list.
pub fn is_relevant(notification: &RawNotification) -> bool {
    notification.action == Action::Push
        && MANIFEST_MEDIA_TYPES.contains(&notification.target.media_type.as_str())
}

/// Keeps the relevant notifications, preserving order.
pub fn filter_notifications<I>(notifications: I) -> Vec<RawNotification>
where
    I: IntoIterator<Item = RawNotification>,
{
    notifications.into_iter().filter(is_relevant).collect()
}

// ---------------------------------------------------------------------------
// Normaliser
// ---------------------------------------------------------------------------

/// Converts an accepted notification into a [`RegistryEvent`].
///
/// The registry host is the authority of `target.url` (host plus any
/// explicit port), since the `repository` field is registry-relative.
pub fn normalize(notification: &RawNotification) -> Result<RegistryEvent, MalformedEvent> {
    let target = &notification.target;
    let registry = registry_authority(&target.url)?;
    let event = RegistryEvent::new(
        registry,
        target.repository.clone(),
        target.tag.clone(),
        target.digest.clone(),
    )?;

    Ok(match &target.platform {
        Some(platform) => event.with_platform(platform.clone()),
        None => event,
    })
}

fn registry_authority(raw: &str) -> Result<String, MalformedEvent> {
    let url = Url::parse(raw).map_err(|e| MalformedEvent::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| MalformedEvent::MissingHost {
            url: raw.to_string(),
        })?;

    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}
