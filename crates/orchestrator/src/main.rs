//! Stress Orchestrator - HTTP front end for provisioning stress agents
//!
//! Accepts stress requests, creates agents through the configured cluster
//! backend and keeps a durable record of every agent for teardown.

use anyhow::Result;
use std::sync::Arc;
use stress_lib::{
    cluster::{ClusterManager, InProcessCluster, ProcessClusterManager},
    health::{components, HealthRegistry},
    load::ControlLoopConfig,
    observability::StructuredLogger,
    orchestrator::OrchestratorBuilder,
    rpc::{AgentConnector, HttpAgentConnector},
    store::RecordStore,
};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

use config::{ClusterBackend, ServiceConfig};

const ORCHESTRATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting stress-orchestrator");

    let config = ServiceConfig::load()?;
    info!(
        application_name = %config.application_name,
        cluster = ?config.cluster,
        failure_policy = ?config.failure_policy,
        "Orchestrator configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::AGENT_STORE).await;
    health_registry.register(components::CLUSTER_MANAGER).await;
    health_registry.register(components::RPC).await;

    let logger = StructuredLogger::new(&config.application_name);
    logger.log_startup(ORCHESTRATOR_VERSION);

    let store = match &config.store_path {
        Some(path) => RecordStore::open(path).await?,
        None => RecordStore::in_memory(),
    };
    let tracked = store.len().await;
    if tracked > 0 {
        info!(records = tracked, "Agent records from a previous run are still tracked");
    }

    let (cluster, connector) = cluster_backend(&config)?;

    let orchestrator = OrchestratorBuilder::new()
        .store(Arc::new(store))
        .cluster(cluster)
        .connector(connector)
        .config(config.orchestrator())
        .health_registry(health_registry.clone())
        .build()?;

    let shutdown = CancellationToken::new();
    let app_state = Arc::new(api::AppState::new(
        orchestrator,
        health_registry.clone(),
        shutdown.clone(),
    ));

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    health_registry.set_ready(false).await;
    shutdown.cancel();
    api_handle.await??;

    info!("Shutdown complete");
    Ok(())
}

fn cluster_backend(
    config: &ServiceConfig,
) -> Result<(Arc<dyn ClusterManager>, Arc<dyn AgentConnector>)> {
    match config.cluster {
        ClusterBackend::Process => {
            let manager = Arc::new(ProcessClusterManager::new(config.process_cluster())?);
            let connector = Arc::new(HttpAgentConnector::new(manager.clone())?);
            info!(agent_binary = %config.agent_binary.display(), "Using process cluster");
            Ok((manager as Arc<dyn ClusterManager>, connector as Arc<dyn AgentConnector>))
        }
        ClusterBackend::InProcess => {
            let cluster = Arc::new(InProcessCluster::new(ControlLoopConfig::default()));
            info!("Using in-process cluster");
            Ok((
                cluster.clone() as Arc<dyn ClusterManager>,
                cluster as Arc<dyn AgentConnector>,
            ))
        }
    }
}
