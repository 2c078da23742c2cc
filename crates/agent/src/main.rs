//! Stress Agent - per-worker CPU and memory load generator
//!
//! Runs under a cluster manager, one process per agent. Load targets arrive
//! over RPC; the control loop turns them into memory pressure and
//! duty-cycled CPU bursts.

use anyhow::Result;
use stress_lib::{
    health::{components, HealthRegistry},
    load::{ControlLoop, LoadController},
    observability::StructuredLogger,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting stress-agent");

    let config = config::AgentConfig::load()?;
    info!(
        service_name = %config.service_name,
        agent_id = ?config.agent_id,
        port = config.port,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new().with_service(&config.service_name);
    health_registry.register(components::LOAD_PROFILE).await;
    health_registry.register(components::RPC).await;

    let logger = StructuredLogger::new(&config.service_name);
    logger.log_startup(AGENT_VERSION);

    let controller = LoadController::new();
    let shutdown = CancellationToken::new();

    let control_loop = ControlLoop::new(
        controller.clone(),
        health_registry.clone(),
        logger.clone(),
        config.control_loop(),
    );
    let loop_handle = tokio::spawn(control_loop.run(shutdown.clone()));

    let mut api_handle = tokio::spawn(api::serve(
        config.port,
        health_registry.clone(),
        controller,
        shutdown.clone(),
    ));

    health_registry.set_ready(true).await;

    tokio::select! {
        reason = wait_for_signal() => {
            logger.log_shutdown(reason?);

            health_registry.set_ready(false).await;
            shutdown.cancel();
            join_control_loop(loop_handle).await;
            api_handle.await??;
        }
        served = &mut api_handle => {
            // Without a listener the orchestrator cannot reach this agent
            health_registry.set_unhealthy(components::RPC, "API server exited").await;
            shutdown.cancel();
            join_control_loop(loop_handle).await;

            if let Err(e) = served? {
                error!(port = config.port, error = %e, "API server failed");
                return Err(e);
            }
            anyhow::bail!("API server exited before shutdown was requested");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

async fn join_control_loop(handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        warn!(error = %e, "Control loop task failed");
    }
}

/// Wait for SIGINT, or SIGTERM from the cluster manager
#[cfg(unix)]
async fn wait_for_signal() -> Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            Ok("SIGINT received")
        }
        _ = terminate.recv() => Ok("SIGTERM received"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl-C received")
}
