//! HTTP API: load-controller RPC, health checks and Prometheus metrics

use axum::Router;
use stress_lib::{health::HealthRegistry, load::LoadController, ops, rpc};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Create the API router
pub fn create_router(health_registry: HealthRegistry, controller: LoadController) -> Router {
    ops::router(health_registry).merge(rpc::router(controller))
}

/// Bind the listener and serve until `shutdown` fires
pub async fn serve(
    port: u16,
    health_registry: HealthRegistry,
    controller: LoadController,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = create_router(health_registry, controller);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    Ok(())
}
