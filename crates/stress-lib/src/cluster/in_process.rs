//! Cluster manager that hosts agents inside the current process
//!
//! Useful for local simulation: every worker is a [`LoadController`] with an
//! optional control loop, reachable without a network hop. The first status
//! query of a new worker reports its health as not yet indexed.

use super::{
    ClusterManager, HealthLookup, HealthState, ProcessStatusReport, ServiceStatus,
    WorkerDescriptor, WorkerHandle,
};
use crate::error::{ClusterError, RpcError};
use crate::health::HealthRegistry;
use crate::load::{ControlLoop, ControlLoopConfig, LoadController};
use crate::models::AgentEndpoint;
use crate::observability::StructuredLogger;
use crate::rpc::{AgentConnector, AgentRpc};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

struct InProcessAgent {
    controller: LoadController,
    health: HealthRegistry,
    cancel: CancellationToken,
    polls: AtomicU32,
}

pub struct InProcessCluster {
    agents: DashMap<String, Arc<InProcessAgent>>,
    loop_config: Option<ControlLoopConfig>,
    shutdown: CancellationToken,
}

impl InProcessCluster {
    /// Cluster whose agents run their control loops with `loop_config`
    pub fn new(loop_config: ControlLoopConfig) -> Self {
        Self {
            agents: DashMap::new(),
            loop_config: Some(loop_config),
            shutdown: CancellationToken::new(),
        }
    }

    /// Cluster whose agents only hold targets and never generate load
    pub fn without_load() -> Self {
        Self {
            agents: DashMap::new(),
            loop_config: None,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Controller of a running agent
    pub fn controller(&self, service_name: &str) -> Option<LoadController> {
        self.agents.get(service_name).map(|a| a.controller.clone())
    }

    /// Stop every agent's control loop
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl ClusterManager for InProcessCluster {
    async fn create_worker_process(
        &self,
        descriptor: &WorkerDescriptor,
    ) -> Result<WorkerHandle, ClusterError> {
        let mut causes = descriptor.validate();
        if self.agents.contains_key(&descriptor.service_name) {
            causes.push("worker already exists".to_string());
        }
        if !causes.is_empty() {
            return Err(ClusterError::Create {
                service: descriptor.service_name.clone(),
                causes,
            });
        }

        let agent = Arc::new(InProcessAgent {
            controller: LoadController::new(),
            health: HealthRegistry::new(),
            cancel: self.shutdown.child_token(),
            polls: AtomicU32::new(0),
        });

        if let Some(config) = &self.loop_config {
            let control = ControlLoop::new(
                agent.controller.clone(),
                agent.health.clone(),
                StructuredLogger::new(descriptor.service_name.clone()),
                config.clone(),
            );
            tokio::spawn(control.run(agent.cancel.clone()));
        }
        agent.health.set_ready(true).await;

        info!(worker = %descriptor.service_name, "Started in-process agent");
        self.agents.insert(descriptor.service_name.clone(), agent);

        Ok(WorkerHandle {
            service_name: descriptor.service_name.clone(),
        })
    }

    async fn delete_worker_process(
        &self,
        handle: &WorkerHandle,
        _force: bool,
    ) -> Result<(), ClusterError> {
        let (_, agent) = self
            .agents
            .remove(&handle.service_name)
            .ok_or_else(|| ClusterError::NotFound(handle.service_name.clone()))?;

        agent.cancel.cancel();
        info!(worker = %handle.service_name, "Stopped in-process agent");
        Ok(())
    }

    async fn query_process_status(
        &self,
        handle: &WorkerHandle,
    ) -> Result<ProcessStatusReport, ClusterError> {
        let agent = self
            .agents
            .get(&handle.service_name)
            .map(|a| a.value().clone())
            .ok_or_else(|| ClusterError::NotFound(handle.service_name.clone()))?;

        if agent.polls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Ok(ProcessStatusReport {
                status: ServiceStatus::Active,
                health: HealthLookup::NotIndexed,
            });
        }

        let health = if agent.health.readiness().await.ready {
            HealthState::Ok
        } else {
            HealthState::Warning
        };
        Ok(ProcessStatusReport {
            status: ServiceStatus::Active,
            health: HealthLookup::State(health),
        })
    }
}

#[async_trait]
impl AgentConnector for InProcessCluster {
    async fn connect(&self, endpoint: &AgentEndpoint) -> Result<Arc<dyn AgentRpc>, RpcError> {
        let controller = self
            .controller(&endpoint.service_name)
            .ok_or_else(|| RpcError::Unresolved(endpoint.service_name.clone()))?;
        Ok(Arc::new(controller))
    }
}

impl Drop for InProcessCluster {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
