//! Translation of a [`ScanJobSpec`] into a `batch/v1` Job object.
//!
//! Kubernetes label values may only contain `[A-Za-z0-9._-]`. The domain
//! label set keeps `/` in repository paths, so values are passed through
//! [`wire_label_value`] on the way out, both for the object and for the
//! selector used to find it again.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::Job;
use pipeline::{EnvBinding, LabelSet, ScanJobSpec};
use serde_json::{json, Value};

/// Encodes one label value for the Kubernetes label syntax.
pub fn wire_label_value(value: &str) -> String {
    value.replace('/', ".")
}

/// Encodes every value of `labels`.
pub fn wire_labels(labels: &LabelSet) -> BTreeMap<String, String> {
    labels
        .iter()
        .map(|(k, v)| (k.to_string(), wire_label_value(v)))
        .collect()
}

/// Renders `selector` as an equality selector in wire encoding.
pub fn wire_selector(selector: &LabelSet) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{k}={}", wire_label_value(v)))
        .collect::<Vec<_>>()
        .join(",")
}

fn env_var(binding: &EnvBinding) -> Value {
    match binding {
        EnvBinding::Value { name, value } => json!({ "name": name, "value": value }),
        EnvBinding::SecretKey { name, secret, key } => json!({
            "name": name,
            "valueFrom": {
                "secretKeyRef": { "name": secret.as_str(), "key": key }
            }
        }),
    }
}

/// Builds the Job object for `spec`.
pub fn to_job(spec: &ScanJobSpec) -> Result<Job, serde_json::Error> {
    let container = spec.container();
    let labels = wire_labels(spec.labels());

    serde_json::from_value(json!({
        "apiVersion": "batch/v1",
        "kind": "Job",
        "metadata": {
            "name": spec.name().as_str(),
            "namespace": spec.namespace().as_str(),
            "labels": labels,
        },
        "spec": {
            "template": {
                "metadata": { "labels": labels },
                "spec": {
                    "restartPolicy": spec.restart_policy().as_str(),
                    "containers": [{
                        "name": container.name,
                        "image": container.image,
                        "command": container.command,
                        "args": container.args,
                        "env": container.env.iter().map(env_var).collect::<Vec<_>>(),
                    }],
                },
            },
        },
    }))
}
