//! Command-line and environment configuration.

use std::time::Duration;

use anyhow::{anyhow, ensure};
use clap::Parser;
use dispatch::WorkerPoolConfig;
use pipeline::Namespace;

/// Creates one vulnerability-scan job per pushed image and platform.
#[derive(Parser, Debug, Clone)]
#[command(name = "regscan", version)]
pub struct Config {
    /// Port the webhook listener binds on all interfaces.
    #[arg(long, env = "REGSCAN_PORT", default_value_t = 8081)]
    pub port: u16,

    /// Namespace scan jobs are created in.
    #[arg(long, env = "REGSCAN_NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Skip TLS verification against the registry, for lookups and scans.
    #[arg(long, env = "REGSCAN_INSECURE_REGISTRY")]
    pub insecure_registry: bool,

    /// Concurrent dispatch workers.
    #[arg(long, env = "REGSCAN_WORKERS", default_value_t = 4)]
    pub workers: usize,

    /// Events buffered between the listener and the workers.
    #[arg(long, env = "REGSCAN_QUEUE_CAPACITY", default_value_t = dispatch::DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Bound, in seconds, on each registry or cluster call.
    #[arg(long, env = "REGSCAN_CALL_TIMEOUT", default_value_t = 30)]
    pub call_timeout: u64,

    /// Dispatch attempts per event before it is dropped.
    #[arg(long, env = "REGSCAN_MAX_ATTEMPTS", default_value_t = 5)]
    pub max_attempts: u32,

    /// Emit logs as JSON lines.
    #[arg(long, env = "REGSCAN_LOG_JSON")]
    pub log_json: bool,

    /// OTLP gRPC endpoint for trace export, e.g. `http://localhost:4317`.
    #[arg(long, env = "REGSCAN_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

/// Validated, read-only settings shared by every component.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub namespace: Namespace,
    pub insecure_registry: bool,
    pub queue_capacity: usize,
    pub call_timeout: Duration,
    pub workers: WorkerPoolConfig,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<Settings> {
        ensure!(
            is_dns_label(&self.namespace),
            "--namespace '{}' is not a valid Kubernetes namespace name",
            self.namespace
        );
        ensure!(self.workers >= 1, "--workers must be at least 1");
        ensure!(self.queue_capacity >= 1, "--queue-capacity must be at least 1");
        ensure!(self.max_attempts >= 1, "--max-attempts must be at least 1");
        ensure!(self.call_timeout >= 1, "--call-timeout must be at least 1 second");

        let namespace = Namespace::new(self.namespace.clone())
            .ok_or_else(|| anyhow!("--namespace must not be empty"))?;

        Ok(Settings {
            port: self.port,
            namespace,
            insecure_registry: self.insecure_registry,
            queue_capacity: self.queue_capacity,
            call_timeout: Duration::from_secs(self.call_timeout),
            workers: WorkerPoolConfig {
                workers: self.workers,
                max_attempts: self.max_attempts,
                ..WorkerPoolConfig::default()
            },
        })
    }
}

/// RFC 1123 label: lowercase alphanumerics and `-`, alphanumeric at both
/// ends, at most 63 characters.
fn is_dns_label(value: &str) -> bool {
    let bytes = value.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= 63
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes.first().is_some_and(u8::is_ascii_alphanumeric)
        && bytes.last().is_some_and(u8::is_ascii_alphanumeric)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("regscan").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_match_documented_values() {
        let settings = parse(&[]).validate().unwrap();
        assert_eq!(settings.port, 8081);
        assert_eq!(settings.namespace.as_str(), "default");
        assert!(!settings.insecure_registry);
        assert_eq!(settings.queue_capacity, 128);
        assert_eq!(settings.call_timeout, Duration::from_secs(30));
        assert_eq!(settings.workers.workers, 4);
        assert_eq!(settings.workers.max_attempts, 5);
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "--port",
            "9000",
            "--namespace",
            "scans",
            "--insecure-registry",
            "--workers",
            "2",
            "--call-timeout",
            "5",
            "--log-json",
            "--otlp-endpoint",
            "http://collector:4317",
        ]);
        assert!(config.log_json);
        assert_eq!(config.otlp_endpoint.as_deref(), Some("http://collector:4317"));

        let settings = config.validate().unwrap();
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.namespace.as_str(), "scans");
        assert!(settings.insecure_registry);
        assert_eq!(settings.workers.workers, 2);
        assert_eq!(settings.call_timeout, Duration::from_secs(5));
    }

    #[test]
    fn rejects_out_of_range_values() {
        for args in [
            &["--workers", "0"][..],
            &["--queue-capacity", "0"],
            &["--max-attempts", "0"],
            &["--call-timeout", "0"],
            &["--namespace", "Scans"],
            &["--namespace", "-scans"],
            &["--namespace", ""],
        ] {
            assert!(parse(args).validate().is_err(), "{args:?}");
        }
    }

    #[test]
    fn dns_labels() {
        assert!(is_dns_label("default"));
        assert!(is_dns_label("team-1"));
        assert!(!is_dns_label("team_1"));
        assert!(!is_dns_label("team-"));
        assert!(!is_dns_label(&"a".repeat(64)));
    }
}
