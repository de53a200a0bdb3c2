pub mod app;
pub mod config;
pub mod error;
pub mod services;

use std::{net::SocketAddr, path::PathBuf};

use factory::factories::{kubernetes::Kubernetes, observability::Observability};
use tokio::task::JoinSet;
use tracing::{error, info};
use utility::shutdown_signal::shutdown_signal;

use crate::{
    app::Readiness,
    config::Config,
    error::AppError,
    services::{
        build_service::BuildService,
        controller::{Context, run_controller},
        resource_manager::ResourceManager,
        store::KubeStore,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // These are baked at COMPILE time
    let cargo_manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let cargo_crate_name = env!("CARGO_CRATE_NAME");
    let cargo_pkg_name = env!("CARGO_PKG_NAME");
    let cargo_pkg_version = env!("CARGO_PKG_VERSION");

    // Load workspace root .env as fallback
    dotenvy::dotenv().ok();
    // Load service-specific .env
    dotenvy::from_path(cargo_manifest_dir.join(".env")).ok();

    let config_path = std::env::var("CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| cargo_manifest_dir.join("config.json"));
    let config = Config::init(config_path).await?;

    let _guard = Observability::init(
        cargo_crate_name.to_string(),
        cargo_pkg_version.to_string(),
        &config.observability,
    )
    .await?;

    let kubernetes = Kubernetes::new(&config.kubernetes).await?;
    let resources = ResourceManager::new(
        KubeStore::new(kubernetes.client.clone()),
        config.operator.poll_policy(),
    );
    let context = Context {
        service: BuildService::new(resources, config.images.clone()),
        config: config.operator.clone(),
    };
    let readiness = Readiness::default();

    let mut set = JoinSet::new();

    set.spawn(run_controller(
        kubernetes.client,
        context,
        readiness.clone(),
    ));
    set.spawn(start_health_server(
        cargo_pkg_name,
        cargo_pkg_version,
        config.server_address,
        readiness,
    ));

    info!("✅ All background tasks started");

    // Unified shutdown logic
    tokio::select! {
        _ = shutdown_signal() => {
            info!("🛑 Shutdown signal received");
            set.shutdown().await;
        }
        Some(result) = set.join_next() => {
            match result {
                Ok(Ok(())) => info!("A background task finished"),
                Ok(Err(e)) => error!("Task failed: {}", e),
                Err(e) => error!("Task panic: {}", e),
            }
            set.shutdown().await;
        }
    }

    info!("👋 {} shutting down", cargo_pkg_name);

    Ok(())
}

async fn start_health_server(
    cargo_pkg_name: &'static str,
    cargo_pkg_version: &'static str,
    addr: SocketAddr,
    readiness: Readiness,
) -> Result<(), AppError> {
    let app = app::app(cargo_pkg_name, cargo_pkg_version, readiness);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("🚀 {} health server running at {:#?}", cargo_pkg_name, addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}
