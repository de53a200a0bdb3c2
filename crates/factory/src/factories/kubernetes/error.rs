use thiserror::Error;

#[derive(Error, Debug)]
pub enum KubernetesError {
    #[error("Kube client error, {0}")]
    KubeError(#[from] kube::Error),
    #[error("In-cluster config error, {0}")]
    InClusterError(#[from] kube_client::config::InClusterError),
    #[error("Kubeconfig error, {0}")]
    KubeconfigError(#[from] kube_client::config::KubeconfigError),
    #[error("Inferred config error, {0}")]
    InferConfigError(#[from] kube_client::config::InferConfigError),
}
