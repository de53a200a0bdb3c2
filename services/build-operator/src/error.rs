use std::time::Duration;

use build_core::error::CoreError;
use thiserror::Error;

use crate::services::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    // Invalid BuildPlan, surfaced on its status
    #[error("{0}")]
    CoreError(#[from] CoreError),

    #[error("Cluster store error, {0}")]
    StoreError(#[from] StoreError),

    #[error("Timed out after {elapsed:?} waiting for {operation}")]
    Timeout {
        operation: String,
        elapsed: Duration,
    },

    /// Another attempt of the manifest is still queued or running.
    #[error("Build {build} is still in flight")]
    BuildInFlight { build: String },

    #[error("Kube error, {0}")]
    KubeError(#[from] kube::Error),

    #[error("IO error, {0}")]
    IoError(#[from] std::io::Error),
}
