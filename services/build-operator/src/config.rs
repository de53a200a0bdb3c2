use std::{net::SocketAddr, path::PathBuf, time::Duration};

use build_core::configs::ImageDefaults;
use config::{ConfigBuilder, ConfigError, Environment, File, builder::AsyncState};
use factory::factories::{kubernetes::KubernetesConfig, observability::ObservabilityConfig};
use serde::Deserialize;
use utility::poll::PollPolicy;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server_address: SocketAddr,
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub kubernetes: KubernetesConfig,
    #[serde(default)]
    pub operator: OperatorConfig,
    #[serde(default)]
    pub images: ImageDefaults,
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Restricts the controller to one namespace; all namespaces when unset.
    pub watch_namespace: Option<String>,
    #[serde(default = "requeue_interval_secs_default")]
    pub requeue_interval_secs: u64,
    #[serde(default = "error_requeue_secs_default")]
    pub error_requeue_secs: u64,
    #[serde(default = "poll_interval_ms_default")]
    pub poll_interval_ms: u64,
    #[serde(default = "poll_timeout_secs_default")]
    pub poll_timeout_secs: u64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            requeue_interval_secs: requeue_interval_secs_default(),
            error_requeue_secs: error_requeue_secs_default(),
            poll_interval_ms: poll_interval_ms_default(),
            poll_timeout_secs: poll_timeout_secs_default(),
        }
    }
}

impl OperatorConfig {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_millis(self.poll_interval_ms),
            Duration::from_secs(self.poll_timeout_secs),
        )
    }

    pub fn requeue_interval(&self) -> Duration {
        Duration::from_secs(self.requeue_interval_secs)
    }

    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }
}

fn requeue_interval_secs_default() -> u64 {
    300
}

fn error_requeue_secs_default() -> u64 {
    15
}

fn poll_interval_ms_default() -> u64 {
    500
}

fn poll_timeout_secs_default() -> u64 {
    30
}

impl Config {
    pub async fn init(path: PathBuf) -> Result<Self, ConfigError> {
        let cfg = ConfigBuilder::<AsyncState>::default()
            .add_source(File::from(path))
            // OPERATOR__POLL_TIMEOUT_SECS=60 reaches nested sections
            .add_source(Environment::default().separator("__"))
            .build()
            .await?;

        cfg.try_deserialize()
    }
}
