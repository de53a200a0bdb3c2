use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use axum::{
    Json, Router,
    extract::{ConnectInfo, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

/// Flipped once the controller has started watching.
#[derive(Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn mark_ready(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub fn app(
    cargo_pkg_name: &'static str,
    cargo_pkg_version: &'static str,
    readiness: Readiness,
) -> Router {
    let name = cargo_pkg_name;
    let version = cargo_pkg_version;

    Router::new()
        .route(
            "/",
            get(move |connect_info| root_handler(name, version, connect_info)),
        )
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .fallback(not_found_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(readiness)
}

#[instrument(name = "root_handler", skip_all)]
async fn root_handler(
    cargo_pkg_name: &'static str,
    cargo_pkg_version: &'static str,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    info!(%addr, "client connected");
    Json(json!({
        "service": cargo_pkg_name,
        "version": cargo_pkg_version,
        "status": "ok"
    }))
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

async fn ready_handler(State(readiness): State<Readiness>) -> impl IntoResponse {
    if readiness.is_ready() {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "starting" })),
        )
    }
}

#[instrument(name = "not_found_handler", skip_all, fields(addr = %addr))]
async fn not_found_handler(ConnectInfo(addr): ConnectInfo<SocketAddr>) -> impl IntoResponse {
    info!(%addr, "client connected");
    (StatusCode::NOT_FOUND, "nothing to see here")
}
