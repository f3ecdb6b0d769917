use crate::k8s::kube_feed::KubeChangeFeed;
use crate::{MeshwatchError, Result};
use k8s_openapi::api::core::v1::Pod;
use kube::Client;
use tracing::{debug, info};

pub struct K8sClient {
    client: Client,
}

impl K8sClient {
    pub async fn try_default() -> Result<Self> {
        debug!("Initializing Kubernetes client");

        let client = Client::try_default().await.map_err(|e| {
            MeshwatchError::KubernetesError(format!("Failed to create K8s client: {}", e))
        })?;

        info!("Successfully connected to Kubernetes cluster");

        Ok(Self { client })
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// Change feed over pods in all namespaces
    pub fn pod_feed(&self) -> KubeChangeFeed<Pod> {
        KubeChangeFeed::new(self.client.clone())
    }
}
