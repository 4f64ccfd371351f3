//! The scan-job definition and its builder.
//!
//! A [`ScanJobSpec`] is built fresh for every dispatch and handed to the
//! [`crate::JobStore`] by reference. Building is pure: identical inputs give
//! an identical spec, which the create-if-absent contract relies on.

use crate::{Fingerprint, LabelSet, Namespace, Platform, RegistryEvent, SecretName};

// ---------------------------------------------------------------------------
// Scanner constants
// ---------------------------------------------------------------------------

/// Fixed description of the scanner the job runs.
pub mod scanner {
    /// Container name inside the job's pod.
    pub const CONTAINER_NAME: &str = "scan";
    /// Scanner image.
    pub const IMAGE: &str = "snyk/snyk:linux";
    /// Scanner entrypoint.
    pub const COMMAND: &str = "snyk";
    /// Secret holding the scanner credentials.
    pub const CREDENTIALS_SECRET: &str = "snyk-token";
    /// Environment variable and secret key for the API token.
    pub const TOKEN_KEY: &str = "SNYK_TOKEN";
    /// Environment variable and secret key for the organisation.
    pub const ORG_KEY: &str = "SNYK_ORG";
}

// ---------------------------------------------------------------------------
// Spec types
// ---------------------------------------------------------------------------

/// Pod restart behaviour for the scan job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    OnFailure,
}

impl RestartPolicy {
    /// The platform's spelling of the policy.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OnFailure => "OnFailure",
        }
    }
}

/// One environment variable of the scan container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvBinding {
    /// A non-sensitive literal value.
    Value {
        name: String,
        value: String,
    },
    /// A value read by the platform from a secret at pod start.
    SecretKey {
        name: String,
        secret: SecretName,
        key: String,
    },
}

impl EnvBinding {
    /// The environment variable name.
    pub fn name(&self) -> &str {
        match self {
            Self::Value { name, .. } | Self::SecretKey { name, .. } => name,
        }
    }
}

/// The single container of a scan job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanContainer {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub args: Vec<String>,
    pub env: Vec<EnvBinding>,
}

/// A complete scan-job definition, ready to hand to the orchestration platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanJobSpec {
    name: Fingerprint,
    namespace: Namespace,
    labels: LabelSet,
    restart_policy: RestartPolicy,
    container: ScanContainer,
}

impl ScanJobSpec {
    /// Job name; always the artifact fingerprint.
    pub fn name(&self) -> &Fingerprint {
        &self.name
    }

    /// Namespace the job is placed into.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Labels attached to the job: the lookup selector plus the fingerprint.
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn restart_policy(&self) -> RestartPolicy {
        self.restart_policy
    }

    pub fn container(&self) -> &ScanContainer {
        &self.container
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builds [`ScanJobSpec`]s from process-wide settings fixed at startup.
#[derive(Debug, Clone)]
pub struct JobSpecBuilder {
    namespace: Namespace,
    insecure_registry: bool,
    credentials: SecretName,
}

impl JobSpecBuilder {
    /// `insecure_registry` adds the scanner's `--insecure` flag to every job.
    pub fn new(namespace: Namespace, insecure_registry: bool) -> Self {
        Self {
            namespace,
            insecure_registry,
            credentials: SecretName::from_static(scanner::CREDENTIALS_SECRET),
        }
    }

    /// Namespace jobs are placed into.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Whether the registry is reached without TLS verification.
    pub fn insecure_registry(&self) -> bool {
        self.insecure_registry
    }

    /// Produces the job for `event` on the already-resolved `platform`.
    pub fn build(&self, event: &RegistryEvent, platform: &Platform) -> ScanJobSpec {
        let name = Fingerprint::derive(event, platform);
        let labels = LabelSet::derive(event, platform).with_fingerprint(&name);

        ScanJobSpec {
            name,
            namespace: self.namespace.clone(),
            labels,
            restart_policy: RestartPolicy::OnFailure,
            container: ScanContainer {
                name: scanner::CONTAINER_NAME.to_string(),
                image: scanner::IMAGE.to_string(),
                command: vec![scanner::COMMAND.to_string()],
                args: self.arguments(event, platform),
                env: self.environment(),
            },
        }
    }

    fn arguments(&self, event: &RegistryEvent, platform: &Platform) -> Vec<String> {
        let mut args: Vec<String> = ["container", "monitor", "-d"]
            .into_iter()
            .map(String::from)
            .collect();
        args.push(format!("--org=$({})", scanner::ORG_KEY));
        if self.insecure_registry {
            args.push("--insecure".to_string());
        }
        args.push(format!(
            "--target-reference={}@{}",
            event.tag(),
            event.digest()
        ));
        args.push(format!("--platform={platform}"));
        args.push(event.reference());
        args
    }

    fn environment(&self) -> Vec<EnvBinding> {
        vec![
            EnvBinding::SecretKey {
                name: scanner::TOKEN_KEY.to_string(),
                secret: self.credentials.clone(),
                key: scanner::TOKEN_KEY.to_string(),
            },
            EnvBinding::SecretKey {
                name: scanner::ORG_KEY.to_string(),
                secret: self.credentials.clone(),
                key: scanner::ORG_KEY.to_string(),
            },
            EnvBinding::Value {
                name: "SNYK_DISABLE_ANALYTICS".to_string(),
                value: "1".to_string(),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label_keys;

    const DIGEST: &str = "sha256:e692418e4cbaf90ca69d05a66403747baa33ee08806650b51fab815ad7fc331f";

    fn builder(insecure: bool) -> JobSpecBuilder {
        JobSpecBuilder::new(Namespace::new("scans").unwrap(), insecure)
    }

    fn ubuntu() -> RegistryEvent {
        RegistryEvent::new("docker.io", "library/ubuntu", "latest", DIGEST).unwrap()
    }

    #[test]
    fn spec_identity_comes_from_fingerprint() {
        let platform = Platform::new("linux", "amd64");
        let spec = builder(false).build(&ubuntu(), &platform);

        let fp = Fingerprint::derive(&ubuntu(), &platform);
        assert_eq!(spec.name(), &fp);
        assert_eq!(spec.namespace().as_str(), "scans");
        assert_eq!(spec.labels().get(label_keys::FINGERPRINT), Some(fp.as_str()));
        assert_eq!(spec.restart_policy(), RestartPolicy::OnFailure);
    }

    #[test]
    fn arguments_encode_reference_and_platform() {
        let spec = builder(false).build(&ubuntu(), &Platform::new("linux", "amd64"));
        assert_eq!(
            spec.container().args,
            vec![
                "container".to_string(),
                "monitor".into(),
                "-d".into(),
                "--org=$(SNYK_ORG)".into(),
                format!("--target-reference=latest@{DIGEST}"),
                "--platform=linux/amd64".into(),
                format!("docker.io/library/ubuntu@{DIGEST}"),
            ]
        );
        assert_eq!(spec.container().command, vec!["snyk".to_string()]);
        assert_eq!(spec.container().image, "snyk/snyk:linux");
    }

    #[test]
    fn insecure_registry_adds_flag_and_variant_is_kept() {
        let spec = builder(true).build(
            &ubuntu(),
            &Platform::new("linux", "arm").with_variant("v7"),
        );
        let args = &spec.container().args;
        assert!(args.contains(&"--insecure".to_string()));
        assert!(args.contains(&"--platform=linux/arm/v7".to_string()));
    }

    #[test]
    fn credentials_are_bound_by_reference() {
        let spec = builder(false).build(&ubuntu(), &Platform::new("linux", "amd64"));
        let env = &spec.container().env;
        let names: Vec<_> = env.iter().map(EnvBinding::name).collect();
        assert_eq!(names, ["SNYK_TOKEN", "SNYK_ORG", "SNYK_DISABLE_ANALYTICS"]);

        for binding in env.iter().take(2) {
            match binding {
                EnvBinding::SecretKey { secret, key, name } => {
                    assert_eq!(secret.as_str(), "snyk-token");
                    assert_eq!(key, name);
                }
                other => panic!("credential inlined as literal: {other:?}"),
            }
        }
    }

    #[test]
    fn build_is_deterministic() {
        let platform = Platform::new("linux", "ppc64le");
        assert_eq!(
            builder(true).build(&ubuntu(), &platform),
            builder(true).build(&ubuntu(), &platform)
        );
    }
}
