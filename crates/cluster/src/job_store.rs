//! [`JobStore`] backed by the Kubernetes `batch/v1` Jobs API.

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use kube::api::{ListParams, PostParams};
use kube::{Api, Client};
use pipeline::{JobRef, JobStore, JobStoreError, LabelSet, Namespace, ScanJobSpec};
use tracing::debug;

use crate::manifest::{to_job, wire_selector};

/// Lists and creates scan jobs through the Kubernetes API server.
///
/// The API server's create is atomic per name and answers `409 Conflict`
/// for a duplicate, which is mapped to [`JobStoreError::AlreadyExists`].
#[derive(Clone)]
pub struct KubeJobStore {
    client: Client,
}

impl std::fmt::Debug for KubeJobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeJobStore").finish_non_exhaustive()
    }
}

impl KubeJobStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connects using in-cluster configuration or the local kubeconfig.
    pub async fn try_default() -> Result<Self, kube::Error> {
        Ok(Self::new(Client::try_default().await?))
    }

    fn jobs(&self, namespace: &Namespace) -> Api<Job> {
        Api::namespaced(self.client.clone(), namespace.as_str())
    }
}

#[async_trait]
impl JobStore for KubeJobStore {
    async fn list_jobs(
        &self,
        namespace: &Namespace,
        selector: &LabelSet,
    ) -> Result<Vec<JobRef>, JobStoreError> {
        let selector = wire_selector(selector);
        debug!(%namespace, %selector, "listing scan jobs");
        let params = ListParams::default().labels(&selector);
        let list = self
            .jobs(namespace)
            .list(&params)
            .await
            .map_err(|e| classify(e, ""))?;

        Ok(list
            .items
            .into_iter()
            .map(|job| JobRef {
                name: job.metadata.name.unwrap_or_default(),
                labels: job.metadata.labels.unwrap_or_default(),
            })
            .collect())
    }

    async fn create_job(&self, spec: &ScanJobSpec) -> Result<(), JobStoreError> {
        let job = to_job(spec).map_err(|e| JobStoreError::Rejected {
            message: format!("job manifest does not match the Job schema: {e}"),
        })?;
        self.jobs(spec.namespace())
            .create(&PostParams::default(), &job)
            .await
            .map(|_| ())
            .map_err(|e| classify(e, spec.name().as_str()))
    }
}

/// Maps an API error onto the port's taxonomy.
fn classify(err: kube::Error, name: &str) -> JobStoreError {
    match err {
        kube::Error::Api(resp) if resp.code == 409 => JobStoreError::AlreadyExists {
            name: name.to_string(),
        },
        kube::Error::Api(resp) if resp.code == 429 || resp.code >= 500 => {
            JobStoreError::Unavailable {
                message: format!("{} ({}): {}", resp.reason, resp.code, resp.message),
            }
        }
        kube::Error::Api(resp) => JobStoreError::Rejected {
            message: format!("{} ({}): {}", resp.reason, resp.code, resp.message),
        },
        other => JobStoreError::Unavailable {
            message: other.to_string(),
        },
    }
}
