//! The canonical description of a pushed artifact.

use crate::{DeliveryId, MalformedEvent, Platform};

/// One pushed image artifact, normalised from a registry notification.
///
/// Constructed once per accepted notification and never mutated. The
/// constructor guarantees a non-empty registry and repository, at least one
/// of tag or digest, and a well-formed digest when one is present, so every
/// consumer can rely on [`RegistryEvent::reference`] being meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryEvent {
    registry: String,
    repository: String,
    tag: String,
    digest: String,
    platform: Option<Platform>,
}

impl RegistryEvent {
    /// Validates and builds an event without platform information.
    ///
    /// `tag` or `digest` may be empty, but not both.
    pub fn new(
        registry: impl Into<String>,
        repository: impl Into<String>,
        tag: impl Into<String>,
        digest: impl Into<String>,
    ) -> Result<Self, MalformedEvent> {
        let registry = registry.into();
        let repository = repository.into();
        let tag = tag.into();
        let digest = digest.into();

        if registry.is_empty() {
            return Err(MalformedEvent::EmptyRegistry);
        }
        if repository.is_empty() {
            return Err(MalformedEvent::EmptyRepository);
        }
        if tag.is_empty() && digest.is_empty() {
            return Err(MalformedEvent::MissingReference);
        }
        if !digest.is_empty() && !is_valid_digest(&digest) {
            return Err(MalformedEvent::InvalidDigest { digest });
        }

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
            platform: None,
        })
    }

    /// Attaches the platform carried by the notification itself.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Registry host, including an explicit port when one was given.
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// Registry-scoped repository path, e.g. `library/ubuntu`.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Tag, or an empty string when only the digest is known.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Content digest in `algorithm:hex` form, or an empty string.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Platform carried by the notification, if any.
    pub fn platform(&self) -> Option<&Platform> {
        self.platform.as_ref()
    }

    /// Canonical reference: digest-qualified when a digest is known,
    /// tag-qualified otherwise.
    pub fn reference(&self) -> String {
        if self.digest.is_empty() {
            format!("{}/{}:{}", self.registry, self.repository, self.tag)
        } else {
            format!("{}/{}@{}", self.registry, self.repository, self.digest)
        }
    }
}

/// An accepted event travelling through the dispatch queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedEvent {
    /// Stable across redeliveries of the same notification.
    pub delivery_id: DeliveryId,
    pub event: RegistryEvent,
    /// Zero-based count of previous dispatch attempts.
    pub attempt: u32,
}

impl QueuedEvent {
    /// Wraps a freshly accepted event.
    pub fn new(event: RegistryEvent) -> Self {
        Self {
            delivery_id: DeliveryId::new_random(),
            event,
            attempt: 0,
        }
    }

    /// The same delivery, one attempt later.
    #[must_use]
    pub fn next_attempt(self) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1),
            ..self
        }
    }
}

/// `algorithm:encoded` per the OCI digest grammar, loosely.
fn is_valid_digest(digest: &str) -> bool {
    let Some((algorithm, encoded)) = digest.split_once(':') else {
        return false;
    };
    let algorithm_ok = algorithm
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && algorithm
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+._-".contains(c));
    let encoded_ok = !encoded.is_empty()
        && encoded
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "=_-".contains(c));
    algorithm_ok && encoded_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "sha256:123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn reference_without_digest_uses_tag() {
        let event = RegistryEvent::new("example.com", "my-app", "v1.0.0", "").unwrap();
        assert_eq!(event.reference(), "example.com/my-app:v1.0.0");
    }

    #[test]
    fn reference_with_digest_prefers_digest() {
        let event = RegistryEvent::new("example.com", "my-app", "v1.0.0", DIGEST).unwrap();
        assert_eq!(event.reference(), format!("example.com/my-app@{DIGEST}"));
    }

    #[test]
    fn digest_only_event_is_accepted() {
        let event = RegistryEvent::new("localhost:5000", "team/app", "", DIGEST).unwrap();
        assert_eq!(event.reference(), format!("localhost:5000/team/app@{DIGEST}"));
        assert!(event.tag().is_empty());
    }

    #[test]
    fn invariants_are_enforced() {
        assert_eq!(
            RegistryEvent::new("", "app", "v1", ""),
            Err(MalformedEvent::EmptyRegistry)
        );
        assert_eq!(
            RegistryEvent::new("r.example", "", "v1", ""),
            Err(MalformedEvent::EmptyRepository)
        );
        assert_eq!(
            RegistryEvent::new("r.example", "app", "", ""),
            Err(MalformedEvent::MissingReference)
        );
        assert!(matches!(
            RegistryEvent::new("r.example", "app", "v1", "not-a-digest"),
            Err(MalformedEvent::InvalidDigest { .. })
        ));
        assert!(matches!(
            RegistryEvent::new("r.example", "app", "v1", "sha256:"),
            Err(MalformedEvent::InvalidDigest { .. })
        ));
    }

    #[test]
    fn redelivery_keeps_delivery_id() {
        let queued = QueuedEvent::new(RegistryEvent::new("r.example", "app", "v1", "").unwrap());
        let id = queued.delivery_id;
        let retried = queued.next_attempt().next_attempt();
        assert_eq!(retried.delivery_id, id);
        assert_eq!(retried.attempt, 2);
    }
}
