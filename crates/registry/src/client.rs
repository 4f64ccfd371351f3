//! [`PlatformLookup`] over the OCI distribution API.

use async_trait::async_trait;
use oci_client::client::{linux_amd64_resolver, ClientConfig, ClientProtocol};
use oci_client::errors::{OciDistributionError, OciErrorCode};
use oci_client::secrets::RegistryAuth;
use oci_client::{Client, Reference};
use pipeline::{Platform, PlatformLookup, RegistryLookupError};
use serde::Deserialize;
use tracing::{debug, instrument};

/// The fields of an image config blob the lookup needs.
#[derive(Debug, Deserialize)]
struct ConfigBlob {
    #[serde(default)]
    os: String,
    #[serde(default)]
    architecture: String,
    #[serde(default)]
    variant: Option<String>,
}

/// Resolves image platforms by pulling the manifest and config blob.
///
/// Multi-platform indexes resolve through their `linux/amd64` child.
/// Credentials are never configured; only anonymous tokens are used.
#[derive(Debug, Clone, Default)]
pub struct RegistryClient;

impl RegistryClient {
    pub fn new() -> Self {
        Self
    }

    /// Builds a client for one lookup. The protocol follows the registry and
    /// the TLS mode follows the caller.
    fn client_for(
        &self,
        image: &Reference,
        insecure_tls: bool,
    ) -> Result<Client, RegistryLookupError> {
        let registry = image.resolve_registry();
        let protocol = if serves_plain_http(registry) {
            ClientProtocol::HttpsExcept(vec![registry.to_string()])
        } else {
            ClientProtocol::Https
        };

        Client::try_from(ClientConfig {
            protocol,
            accept_invalid_certificates: insecure_tls,
            platform_resolver: Some(Box::new(linux_amd64_resolver)),
            ..Default::default()
        })
        .map_err(|e| unreachable_registry(image, &e))
    }
}

#[async_trait]
impl PlatformLookup for RegistryClient {
    #[instrument(skip(self))]
    async fn resolve_platform(
        &self,
        reference: &str,
        insecure_tls: bool,
    ) -> Result<Platform, RegistryLookupError> {
        let image: Reference = reference
            .parse()
            .map_err(|_| RegistryLookupError::InvalidReference {
                reference: reference.to_string(),
            })?;
        let client = self.client_for(&image, insecure_tls)?;

        let (_, digest, config) = client
            .pull_manifest_and_config(&image, &RegistryAuth::Anonymous)
            .await
            .map_err(|e| lookup_error(&image, e))?;
        debug!(%digest, "pulled image manifest");

        let blob: ConfigBlob = serde_json::from_str(&config)
            .map_err(|e| invalid(&image, format!("malformed config blob: {e}")))?;
        if blob.os.is_empty() || blob.architecture.is_empty() {
            return Err(invalid(&image, "config blob lacks os or architecture".to_string()));
        }

        let platform = Platform::new(blob.os, blob.architecture)
            .with_variant(blob.variant.unwrap_or_default());
        debug!(%platform, "resolved platform");
        Ok(platform)
    }
}

/// Loopback and `.local` registries are spoken to over plain HTTP.
fn serves_plain_http(registry: &str) -> bool {
    let host = if registry.starts_with('[') {
        registry.split_inclusive(']').next().unwrap_or(registry)
    } else {
        registry.split(':').next().unwrap_or(registry)
    };
    host == "localhost" || host == "127.0.0.1" || host == "[::1]" || host.ends_with(".local")
}

/// Maps a client failure onto the lookup error taxonomy.
///
/// Transport failures and 408, 429 or 5xx answers are transient. A missing
/// manifest, repository or blob is final. Anything else, including an index
/// without a `linux/amd64` child, is an unusable response.
fn lookup_error(image: &Reference, err: OciDistributionError) -> RegistryLookupError {
    match err {
        OciDistributionError::RequestError(e) => unreachable_registry(image, &e),
        OciDistributionError::ServerError { code: 404, .. } => not_found(image),
        OciDistributionError::ServerError { code, .. }
            if code == 408 || code == 429 || code >= 500 =>
        {
            unreachable_registry(image, &format!("registry answered {code}"))
        }
        OciDistributionError::RegistryError { ref envelope, .. }
            if envelope.errors.iter().any(|e| {
                matches!(
                    e.code,
                    OciErrorCode::ManifestUnknown
                        | OciErrorCode::NameUnknown
                        | OciErrorCode::BlobUnknown
                )
            }) =>
        {
            not_found(image)
        }
        other => invalid(image, other.to_string()),
    }
}

fn not_found(image: &Reference) -> RegistryLookupError {
    RegistryLookupError::ReferenceNotFound {
        reference: image.whole(),
    }
}

fn unreachable_registry(image: &Reference, err: &dyn std::fmt::Display) -> RegistryLookupError {
    RegistryLookupError::Unreachable {
        registry: image.registry().to_string(),
        message: err.to_string(),
    }
}

fn invalid(image: &Reference, message: String) -> RegistryLookupError {
    RegistryLookupError::InvalidResponse {
        reference: image.whole(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::extract::{Path, State};
    use axum::http::{header, HeaderMap, HeaderName, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Json, Router};
    use pipeline::notification::{DOCKER_MANIFEST_V2, OCI_IMAGE_INDEX_V1, OCI_IMAGE_MANIFEST_V1};
    use serde_json::json;
    use sha2::{Digest, Sha256};

    use super::*;

    const ARM64: &str = "sha256:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const OCI_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
    const DOCKER_CONFIG: &str = "application/vnd.docker.container.image.v1+json";

    /// A manifest or blob served under its content digest.
    struct Document {
        media_type: &'static str,
        body: String,
        digest: String,
    }

    impl Document {
        fn new(media_type: &'static str, value: serde_json::Value) -> Self {
            let body = value.to_string();
            let digest = format!("sha256:{:x}", Sha256::digest(body.as_bytes()));
            Self {
                media_type,
                body,
                digest,
            }
        }

        fn descriptor(&self) -> serde_json::Value {
            json!({
                "mediaType": self.media_type,
                "digest": self.digest,
                "size": self.body.len(),
            })
        }

        fn response(&self) -> Response {
            (
                [
                    (header::CONTENT_TYPE, self.media_type.to_string()),
                    (
                        HeaderName::from_static("docker-content-digest"),
                        self.digest.clone(),
                    ),
                ],
                self.body.clone(),
            )
                .into_response()
        }
    }

    struct FakeRegistry {
        realm: String,
        token_requests: AtomicUsize,
        manifests: HashMap<String, Document>,
        blobs: HashMap<String, Document>,
        amd64_digest: String,
    }

    impl FakeRegistry {
        fn new(realm: String) -> Self {
            let amd64_config =
                Document::new(OCI_CONFIG, json!({ "os": "linux", "architecture": "amd64" }));
            let arm_config = Document::new(
                DOCKER_CONFIG,
                json!({ "os": "linux", "architecture": "arm", "variant": "v7" }),
            );
            let amd64 = Document::new(
                OCI_IMAGE_MANIFEST_V1,
                json!({
                    "schemaVersion": 2,
                    "mediaType": OCI_IMAGE_MANIFEST_V1,
                    "config": amd64_config.descriptor(),
                    "layers": []
                }),
            );
            let arm = Document::new(
                DOCKER_MANIFEST_V2,
                json!({
                    "schemaVersion": 2,
                    "mediaType": DOCKER_MANIFEST_V2,
                    "config": arm_config.descriptor(),
                    "layers": []
                }),
            );

            let arm64_entry = json!({
                "mediaType": OCI_IMAGE_MANIFEST_V1,
                "digest": ARM64,
                "size": 1,
                "platform": { "os": "linux", "architecture": "arm64" }
            });
            let mut amd64_entry = amd64.descriptor();
            amd64_entry["platform"] = json!({ "os": "linux", "architecture": "amd64" });
            let index = |entries: serde_json::Value| {
                Document::new(
                    OCI_IMAGE_INDEX_V1,
                    json!({
                        "schemaVersion": 2,
                        "mediaType": OCI_IMAGE_INDEX_V1,
                        "manifests": entries
                    }),
                )
            };

            let amd64_digest = amd64.digest.clone();
            let manifests = HashMap::from([
                ("v1".to_string(), index(json!([arm64_entry, amd64_entry]))),
                ("armonly".to_string(), index(json!([arm64_entry]))),
                ("arm".to_string(), arm),
                (amd64_digest.clone(), amd64),
            ]);
            let blobs = [amd64_config, arm_config]
                .into_iter()
                .map(|doc| (doc.digest.clone(), doc))
                .collect();

            Self {
                realm,
                token_requests: AtomicUsize::new(0),
                manifests,
                blobs,
                amd64_digest,
            }
        }

        fn authorized(&self, headers: &HeaderMap) -> bool {
            headers
                .get(header::AUTHORIZATION)
                .is_some_and(|v| v == "Bearer t0k")
        }

        fn challenge(&self) -> Response {
            (
                StatusCode::UNAUTHORIZED,
                [(
                    header::WWW_AUTHENTICATE,
                    format!(r#"Bearer realm="{}",service="fake""#, self.realm),
                )],
            )
                .into_response()
        }
    }

    fn unknown(code: &str) -> Response {
        let body = json!({ "errors": [{ "code": code, "message": "unknown", "detail": {} }] });
        (StatusCode::NOT_FOUND, Json(body)).into_response()
    }

    async fn ping(State(fake): State<Arc<FakeRegistry>>, headers: HeaderMap) -> Response {
        if !fake.authorized(&headers) {
            return fake.challenge();
        }
        Json(json!({})).into_response()
    }

    async fn token(State(fake): State<Arc<FakeRegistry>>) -> Json<serde_json::Value> {
        fake.token_requests.fetch_add(1, Ordering::SeqCst);
        Json(json!({ "token": "t0k" }))
    }

    async fn manifest(
        State(fake): State<Arc<FakeRegistry>>,
        Path(reference): Path<String>,
        headers: HeaderMap,
    ) -> Response {
        if !fake.authorized(&headers) {
            return fake.challenge();
        }
        if reference == "flaky" {
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
        match fake.manifests.get(&reference) {
            Some(doc) => doc.response(),
            None => unknown("MANIFEST_UNKNOWN"),
        }
    }

    async fn blob(
        State(fake): State<Arc<FakeRegistry>>,
        Path(digest): Path<String>,
        headers: HeaderMap,
    ) -> Response {
        if !fake.authorized(&headers) {
            return fake.challenge();
        }
        match fake.blobs.get(&digest) {
            Some(doc) => doc.response(),
            None => unknown("BLOB_UNKNOWN"),
        }
    }

    /// Starts the fake registry and returns its `host:port` and state.
    async fn start() -> (String, Arc<FakeRegistry>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = listener.local_addr().unwrap().to_string();
        let fake = Arc::new(FakeRegistry::new(format!("http://{host}/token")));
        let app = Router::new()
            .route("/v2/", get(ping))
            .route("/token", get(token))
            .route("/v2/team/app/manifests/{reference}", get(manifest))
            .route("/v2/team/app/blobs/{digest}", get(blob))
            .with_state(fake.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (host, fake)
    }

    #[test]
    fn plain_http_only_for_local_registries() {
        let plain = [
            "localhost:5000",
            "127.0.0.1:5000",
            "[::1]:5000",
            "registry.local",
            "registry.local:5000",
        ];
        for registry in plain {
            assert!(serves_plain_http(registry), "{registry}");
        }
        for registry in ["ghcr.io", "index.docker.io", "localhost.example", "local.example:443"] {
            assert!(!serves_plain_http(registry), "{registry}");
        }
    }

    #[tokio::test]
    async fn index_resolves_through_amd64_child() {
        let (host, fake) = start().await;

        let platform = RegistryClient::new()
            .resolve_platform(&format!("{host}/team/app:v1"), false)
            .await
            .unwrap();

        assert_eq!(platform, Platform::new("linux", "amd64"));
        assert_eq!(fake.token_requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn single_manifest_carries_variant() {
        let (host, _fake) = start().await;

        let platform = RegistryClient::new()
            .resolve_platform(&format!("{host}/team/app:arm"), true)
            .await
            .unwrap();

        assert_eq!(platform, Platform::new("linux", "arm").with_variant("v7"));
    }

    #[tokio::test]
    async fn digest_reference_skips_the_index() {
        let (host, fake) = start().await;

        let platform = RegistryClient::new()
            .resolve_platform(&format!("{host}/team/app@{}", fake.amd64_digest), false)
            .await
            .unwrap();

        assert_eq!(platform, Platform::new("linux", "amd64"));
    }

    #[tokio::test]
    async fn failures_map_to_lookup_errors() {
        let (host, _fake) = start().await;
        let client = RegistryClient::new();

        let missing = client
            .resolve_platform(&format!("{host}/team/app:gone"), false)
            .await
            .unwrap_err();
        assert!(matches!(missing, RegistryLookupError::ReferenceNotFound { .. }));
        assert!(!missing.retry_policy().is_retryable());

        let no_child = client
            .resolve_platform(&format!("{host}/team/app:armonly"), false)
            .await
            .unwrap_err();
        assert!(matches!(no_child, RegistryLookupError::InvalidResponse { .. }));

        let flaky = client
            .resolve_platform(&format!("{host}/team/app:flaky"), false)
            .await
            .unwrap_err();
        assert!(matches!(flaky, RegistryLookupError::Unreachable { .. }));
        assert!(flaky.retry_policy().is_retryable());

        let invalid = client
            .resolve_platform(&format!("{host}/Team/App:v1"), false)
            .await
            .unwrap_err();
        assert!(matches!(invalid, RegistryLookupError::InvalidReference { .. }));
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = RegistryClient::new()
            .resolve_platform(&format!("{host}/team/app:v1"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryLookupError::Unreachable { .. }));
    }
}
