use serde::{Deserialize, Serialize};

/// The parts of a pod the sidecar-acceleration control plane cares about
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub node_name: Option<String>,
    pub pod_ip: Option<String>,
    pub host_network: bool,
    pub phase: String,
    pub has_sidecar: bool,
}

/// Container name injected by Istio and compatible meshes
pub const SIDECAR_CONTAINER: &str = "istio-proxy";

impl PodInfo {
    pub fn from_k8s_pod(pod: &k8s_openapi::api::core::v1::Pod) -> Self {
        let metadata = &pod.metadata;
        let spec = pod.spec.as_ref();
        let status = pod.status.as_ref();

        let has_sidecar = spec
            .map(|s| s.containers.iter().any(|c| c.name == SIDECAR_CONTAINER))
            .unwrap_or(false);

        Self {
            name: metadata.name.clone().unwrap_or_default(),
            namespace: metadata.namespace.clone().unwrap_or_default(),
            uid: metadata.uid.clone().unwrap_or_default(),
            node_name: spec.and_then(|s| s.node_name.clone()),
            pod_ip: status.and_then(|s| s.pod_ip.clone()),
            host_network: spec.and_then(|s| s.host_network).unwrap_or(false),
            phase: status
                .and_then(|s| s.phase.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            has_sidecar,
        }
    }

    /// Pods on the host network share the node's addresses
    pub fn shares_node_ip(&self) -> bool {
        self.host_network
    }
}
