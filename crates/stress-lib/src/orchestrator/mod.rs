//! Agent lifecycle orchestration
//!
//! Creates batches of agents, gates each one on cluster health, pushes its
//! load targets over RPC and keeps a durable record of every agent so it can
//! be torn down later. Records are written before the worker is created, so
//! a failed provision leaves a record that [`Orchestrator::delete_all_agents`]
//! can clean up.

mod readiness;

pub use readiness::{wait_until_ready, ReadinessPolicy};

use crate::clock::{Clock, TokioClock};
use crate::cluster::{ClusterManager, WorkerDescriptor, WorkerHandle};
use crate::error::{ClusterError, OrchestratorError, RpcError};
use crate::health::{components, HealthRegistry};
use crate::models::{AgentEndpoint, AgentId, AgentRecord, LoadSnapshot, StressRequest};
use crate::observability::{StressMetrics, StructuredLogger};
use crate::rpc::AgentConnector;
use crate::store::{AgentStore, AgentTransaction};
use anyhow::Result as AnyResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// What to do with the rest of a batch after one agent fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the failure and move on to the next agent
    #[default]
    Continue,
    /// Stop the batch at the first failure
    Abort,
}

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Application every agent is created under
    pub application_name: String,
    /// Placement hint passed to the cluster manager
    pub placement_constraint: Option<String>,
    /// Status poll interval while waiting for a new agent (default: 200 ms)
    pub poll_interval: Duration,
    /// Give up on a new agent after this long (default: 15 seconds)
    pub provision_timeout: Duration,
    pub failure_policy: FailurePolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let readiness = ReadinessPolicy::default();
        Self {
            application_name: "stress-fleet".to_string(),
            placement_constraint: None,
            poll_interval: readiness.poll_interval,
            provision_timeout: readiness.timeout,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl OrchestratorConfig {
    fn readiness(&self) -> ReadinessPolicy {
        ReadinessPolicy {
            poll_interval: self.poll_interval,
            timeout: self.provision_timeout,
        }
    }
}

/// One agent that could not be provisioned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentFailure {
    pub agent_id: AgentId,
    pub reason: String,
    pub error: String,
}

/// Outcome of a create batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateReport {
    /// Agents that are running with their targets applied, in creation order
    pub created: Vec<AgentId>,
    pub failures: Vec<AgentFailure>,
}

impl CreateReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Orchestrator {
    store: Arc<dyn AgentStore>,
    cluster: Arc<dyn ClusterManager>,
    connector: Arc<dyn AgentConnector>,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
    health: Option<HealthRegistry>,
    metrics: StressMetrics,
    logger: StructuredLogger,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn AgentStore>,
        cluster: Arc<dyn ClusterManager>,
        connector: Arc<dyn AgentConnector>,
        clock: Arc<dyn Clock>,
        config: OrchestratorConfig,
    ) -> Self {
        let logger = StructuredLogger::new(config.application_name.clone());
        Self {
            store,
            cluster,
            connector,
            clock,
            config,
            health: None,
            metrics: StressMetrics::new(),
            logger,
        }
    }

    /// Publish store, cluster manager and RPC outcomes to `health`
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Provision `request.agent_count` agents with clamped targets
    ///
    /// Per-agent failures are collected in the report according to the
    /// failure policy. A store failure ends the batch, since no further
    /// agent could be tracked; agents created before it stay in the report.
    /// Cancelling stops the batch after recording the in-flight agent as
    /// failed; agents already created stay in the report and in the store.
    pub async fn create_agents(
        &self,
        request: StressRequest,
        cancel: &CancellationToken,
    ) -> Result<CreateReport, OrchestratorError> {
        let request = request.clamped();
        let mut report = CreateReport::default();

        info!(
            count = request.agent_count,
            cpu_target = request.cpu_target,
            memory_target_mb = request.memory_target_mb,
            active = request.active,
            "Creating agents"
        );

        for _ in 0..request.agent_count {
            if cancel.is_cancelled() {
                break;
            }

            let agent_id = AgentId::new();
            if let Err(e) = self.track_new_agent(agent_id, &request).await {
                self.record_failure(&mut report, agent_id, &e).await;
                break;
            }
            self.mark_healthy(&[components::AGENT_STORE]).await;

            let started = self.clock.now();
            match self.provision(agent_id, &request, cancel).await {
                Ok(()) => {
                    let elapsed = self.clock.now() - started;
                    self.metrics.inc_agents_created();
                    self.metrics.observe_provision_latency(elapsed.as_secs_f64());
                    self.logger
                        .log_agent_created(agent_id, &request, elapsed.as_millis());
                    self.mark_healthy(&[components::CLUSTER_MANAGER, components::RPC])
                        .await;
                    report.created.push(agent_id);
                }
                Err(e) => {
                    let stop = matches!(e, OrchestratorError::Cancelled)
                        || self.config.failure_policy == FailurePolicy::Abort;
                    self.record_failure(&mut report, agent_id, &e).await;
                    if stop {
                        break;
                    }
                }
            }
        }

        Ok(report)
    }

    /// Remove one agent. Returns false if it was not tracked.
    pub async fn delete_agent(&self, agent_id: AgentId) -> Result<bool, OrchestratorError> {
        let result = self.remove_agent(agent_id).await;
        self.note_store_result(&result).await;
        result
    }

    /// Remove every tracked agent. Returns how many records were removed.
    pub async fn delete_all_agents(&self) -> Result<usize, OrchestratorError> {
        let result = self.remove_all_agents().await;
        self.note_store_result(&result).await;
        result
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentRecord>, OrchestratorError> {
        let result = self.read_records().await;
        self.note_store_result(&result).await;
        result
    }

    async fn read_records(&self) -> Result<Vec<AgentRecord>, OrchestratorError> {
        let mut tx = self.store.begin().await?;
        let records = tx.enumerate().await?;
        tx.abort().await;
        Ok(records)
    }

    /// Durably record a new agent before anything is created for it
    async fn track_new_agent(
        &self,
        agent_id: AgentId,
        request: &StressRequest,
    ) -> Result<(), OrchestratorError> {
        let mut tx = self.store.begin().await?;
        tx.put(AgentRecord::new(agent_id, *request)).await?;
        self.commit_tracked(tx).await
    }

    async fn remove_agent(&self, agent_id: AgentId) -> Result<bool, OrchestratorError> {
        let mut tx = self.store.begin().await?;

        if tx.remove(&agent_id).await?.is_none() {
            tx.abort().await;
            return Ok(false);
        }

        let deleted = self.delete_worker(agent_id).await;
        if let Err(e) = self.commit_tracked(tx).await {
            error!(
                agent_id = %agent_id,
                worker_deleted = deleted,
                error = %e,
                "Record removal not committed; the record outlives its worker"
            );
            return Err(e);
        }

        self.metrics.inc_agents_deleted(1);
        self.logger.log_agent_deleted(agent_id, deleted);
        Ok(true)
    }

    async fn remove_all_agents(&self) -> Result<usize, OrchestratorError> {
        let mut tx = self.store.begin().await?;
        let records = tx.enumerate().await?;

        for record in &records {
            tx.remove(&record.agent_id).await?;
            let deleted = self.delete_worker(record.agent_id).await;
            self.logger.log_agent_deleted(record.agent_id, deleted);
        }

        if let Err(e) = self.commit_tracked(tx).await {
            let agent_ids: Vec<String> = records.iter().map(|r| r.agent_id.to_string()).collect();
            error!(
                agent_ids = %agent_ids.join(","),
                error = %e,
                "Record removal not committed; the records outlive their workers"
            );
            return Err(e);
        }

        self.metrics.inc_agents_deleted(records.len() as u64);
        info!(count = records.len(), "Deleted all agents");
        Ok(records.len())
    }

    async fn provision(
        &self,
        agent_id: AgentId,
        request: &StressRequest,
        cancel: &CancellationToken,
    ) -> Result<(), OrchestratorError> {
        let endpoint = AgentEndpoint::for_agent(&self.config.application_name, agent_id);
        let descriptor = WorkerDescriptor::for_agent(
            &self.config.application_name,
            &endpoint,
            self.config.placement_constraint.clone(),
        );

        let call_started = self.clock.now();
        let created = self.cluster.create_worker_process(&descriptor).await;
        self.metrics
            .observe_create_call_latency((self.clock.now() - call_started).as_secs_f64());

        let handle = match created {
            Ok(handle) => handle,
            Err(e) => {
                if let ClusterError::Create { causes, .. } = &e {
                    self.logger.log_create_failure(&endpoint.service_name, causes);
                }
                return Err(e.into());
            }
        };

        wait_until_ready(
            self.cluster.as_ref(),
            self.clock.as_ref(),
            &handle,
            agent_id,
            self.config.readiness(),
            cancel,
        )
        .await?;

        let applied = tokio::select! {
            _ = cancel.cancelled() => return Err(OrchestratorError::Cancelled),
            applied = self.configure(&endpoint, request) => applied?,
        };
        self.logger.log_agent_configured(agent_id, &applied);
        Ok(())
    }

    /// Push the load targets to a ready agent
    async fn configure(
        &self,
        endpoint: &AgentEndpoint,
        request: &StressRequest,
    ) -> Result<LoadSnapshot, OrchestratorError> {
        let rpc_error = |source: RpcError| OrchestratorError::Rpc {
            agent_id: endpoint.agent_id,
            source,
        };

        let agent = self.connector.connect(endpoint).await.map_err(rpc_error)?;
        let memory_target_mb = agent
            .set_memory_allocation_target_in_mb(request.memory_target_mb)
            .await
            .map_err(rpc_error)?;
        let cpu_target_percent = agent
            .set_cpu_target_percentage(request.cpu_target)
            .await
            .map_err(rpc_error)?;
        let stressing_active = if request.active {
            agent.start_stressing().await
        } else {
            agent.stop_stressing().await
        }
        .map_err(rpc_error)?;

        Ok(LoadSnapshot {
            cpu_target_percent,
            memory_target_mb,
            stressing_active,
        })
    }

    /// Best-effort forced delete of an agent's worker
    async fn delete_worker(&self, agent_id: AgentId) -> bool {
        let endpoint = AgentEndpoint::for_agent(&self.config.application_name, agent_id);
        let handle = WorkerHandle::for_endpoint(&endpoint);

        match self.cluster.delete_worker_process(&handle, true).await {
            Ok(()) => true,
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "Failed to delete worker");
                if let Some(health) = &self.health {
                    health
                        .set_degraded(components::CLUSTER_MANAGER, e.to_string())
                        .await;
                }
                false
            }
        }
    }

    async fn record_failure(
        &self,
        report: &mut CreateReport,
        agent_id: AgentId,
        error: &OrchestratorError,
    ) {
        let reason = error.reason();
        self.metrics.inc_provision_failures(reason);
        self.logger
            .log_provision_failure(agent_id, reason, &error.to_string());
        self.mark_failed(error).await;

        report.failures.push(AgentFailure {
            agent_id,
            reason: reason.to_string(),
            error: error.to_string(),
        });
    }

    async fn mark_healthy(&self, names: &[&str]) {
        if let Some(health) = &self.health {
            for name in names {
                health.set_healthy(name).await;
            }
        }
    }

    /// Store failures make the orchestrator unhealthy; cluster and RPC
    /// failures only degrade it
    async fn mark_failed(&self, error: &OrchestratorError) {
        let Some(health) = &self.health else {
            return;
        };

        match error {
            OrchestratorError::Store(_) => {
                health
                    .set_unhealthy(components::AGENT_STORE, error.to_string())
                    .await
            }
            OrchestratorError::ClusterManager(_) | OrchestratorError::ProvisionTimeout { .. } => {
                health
                    .set_degraded(components::CLUSTER_MANAGER, error.to_string())
                    .await
            }
            OrchestratorError::Rpc { .. } => {
                health.set_degraded(components::RPC, error.to_string()).await
            }
            OrchestratorError::Cancelled => {}
        }
    }

    async fn note_store_result<T>(&self, result: &Result<T, OrchestratorError>) {
        match result {
            Ok(_) => self.mark_healthy(&[components::AGENT_STORE]).await,
            Err(e) => self.mark_failed(e).await,
        }
    }

    async fn commit_tracked(
        &self,
        mut tx: Box<dyn AgentTransaction>,
    ) -> Result<(), OrchestratorError> {
        let tracked = tx.enumerate().await?.len();
        tx.commit().await?;
        self.metrics.set_agents_tracked(tracked as i64);
        Ok(())
    }
}

/// Builder for the orchestrator
pub struct OrchestratorBuilder {
    store: Option<Arc<dyn AgentStore>>,
    cluster: Option<Arc<dyn ClusterManager>>,
    connector: Option<Arc<dyn AgentConnector>>,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
    health: Option<HealthRegistry>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            cluster: None,
            connector: None,
            clock: Arc::new(TokioClock),
            config: OrchestratorConfig::default(),
            health: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn AgentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cluster(mut self, cluster: Arc<dyn ClusterManager>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn connector(mut self, connector: Arc<dyn AgentConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.config.application_name = name.into();
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn health_registry(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn build(self) -> AnyResult<Orchestrator> {
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Agent store is required"))?;
        let cluster = self
            .cluster
            .ok_or_else(|| anyhow::anyhow!("Cluster manager is required"))?;
        let connector = self
            .connector
            .ok_or_else(|| anyhow::anyhow!("Agent connector is required"))?;

        let orchestrator = Orchestrator::new(store, cluster, connector, self.clock, self.config);
        Ok(match self.health {
            Some(health) => orchestrator.with_health(health),
            None => orchestrator,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
