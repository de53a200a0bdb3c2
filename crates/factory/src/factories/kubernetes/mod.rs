pub mod error;
pub mod implementation;

use kube::Client;
use serde::Deserialize;

#[derive(Clone)]
pub struct Kubernetes {
    pub client: Client,
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct KubernetesConfig {
    #[serde(default)]
    pub k8s_in_cluster: bool,
    pub k8s_config_path: Option<String>,
}
