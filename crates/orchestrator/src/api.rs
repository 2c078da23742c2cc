//! HTTP API for agent provisioning, health checks and Prometheus metrics

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use stress_lib::{
    health::HealthRegistry,
    models::{AgentId, StressRequest},
    ops,
    orchestrator::Orchestrator,
    OrchestratorError,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shared application state
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub health_registry: HealthRegistry,
    /// Cancels in-flight provisioning on shutdown
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        orchestrator: Orchestrator,
        health_registry: HealthRegistry,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            orchestrator,
            health_registry,
            shutdown,
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Orchestrator(OrchestratorError::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Orchestrator(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// POST /api/stress - 200 with the new agent ids, 500 with the report if any agent failed
async fn create_agents(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StressRequest>,
) -> Result<Response, ApiError> {
    let cancel = state.shutdown.child_token();
    let report = state.orchestrator.create_agents(request, &cancel).await?;

    if report.is_complete() {
        return Ok((StatusCode::OK, Json(report.created)).into_response());
    }

    warn!(
        created = report.created.len(),
        failed = report.failures.len(),
        "Agent batch finished with failures"
    );
    Ok((StatusCode::INTERNAL_SERVER_ERROR, Json(report)).into_response())
}

/// GET /api/stress
async fn list_agents(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let records = state.orchestrator.list_agents().await?;
    Ok(Json(records).into_response())
}

/// DELETE /api/stress
async fn delete_all_agents(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let deleted = state.orchestrator.delete_all_agents().await?;
    Ok(Json(json!({ "deleted": deleted })).into_response())
}

/// DELETE /api/stress/:agent_id - unknown ids succeed with `deleted: false`
async fn delete_agent(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Result<Response, ApiError> {
    let agent_id: AgentId = agent_id
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid agent id {}: {}", agent_id, e)))?;

    let deleted = state.orchestrator.delete_agent(agent_id).await?;
    Ok(Json(json!({ "agentId": agent_id, "deleted": deleted })).into_response())
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let probes = ops::router(state.health_registry.clone());

    Router::new()
        .route(
            "/api/stress",
            get(list_agents).post(create_agents).delete(delete_all_agents),
        )
        .route("/api/stress/:agent_id", delete(delete_agent))
        .with_state(state)
        .merge(probes)
}

/// Serve until `shutdown` fires
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    Ok(())
}
