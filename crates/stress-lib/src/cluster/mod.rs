//! Cluster manager abstraction
//!
//! The orchestrator only needs three calls from whatever runs the agents:
//! create a worker, delete a worker and report its status and health.
//! Two implementations are provided:
//! - [`ProcessClusterManager`] runs each agent as a local child process
//! - [`InProcessCluster`] runs each agent as an in-process load controller

mod in_process;
mod process;

pub use in_process::InProcessCluster;
pub use process::{ProcessClusterConfig, ProcessClusterManager};

use crate::error::ClusterError;
use crate::models::{AgentEndpoint, AgentId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Service type every agent is created as
pub const AGENT_SERVICE_TYPE: &str = "StressAgentType";

/// Load metric that reserves one core per agent
pub const CPU_CORES_METRIC: &str = "cpu_cores";

/// Lifecycle status of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    Unknown,
    Creating,
    Active,
    Deleting,
    Failed,
}

/// Aggregated health of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Unknown,
    Ok,
    Warning,
    Error,
}

/// Result of a health lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthLookup {
    State(HealthState),
    /// The health subsystem has not seen the worker yet
    NotIndexed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessStatusReport {
    pub status: ServiceStatus,
    pub health: HealthLookup,
}

impl ProcessStatusReport {
    /// Active and healthy at the same time
    pub fn is_ready(&self) -> bool {
        self.status == ServiceStatus::Active && self.health == HealthLookup::State(HealthState::Ok)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricWeight {
    Zero,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadMetric {
    pub name: String,
    pub default_load: u32,
    pub weight: MetricWeight,
}

/// Everything the cluster manager needs to create one agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerDescriptor {
    pub application_name: String,
    pub agent_id: AgentId,
    pub service_name: String,
    pub service_type_name: String,
    pub instance_count: u32,
    /// Run the worker in its own process rather than a shared host
    pub exclusive_process: bool,
    pub placement_constraints: Option<String>,
    pub load_metrics: Vec<LoadMetric>,
}

impl WorkerDescriptor {
    /// Single-instance, exclusive-process agent reserving one core
    pub fn for_agent(
        application_name: &str,
        endpoint: &AgentEndpoint,
        placement_constraints: Option<String>,
    ) -> Self {
        Self {
            application_name: application_name.to_string(),
            agent_id: endpoint.agent_id,
            service_name: endpoint.service_name.clone(),
            service_type_name: AGENT_SERVICE_TYPE.to_string(),
            instance_count: 1,
            exclusive_process: true,
            placement_constraints,
            load_metrics: vec![LoadMetric {
                name: CPU_CORES_METRIC.to_string(),
                default_load: 1,
                weight: MetricWeight::High,
            }],
        }
    }

    /// Reasons this descriptor cannot be honored, empty if valid
    pub fn validate(&self) -> Vec<String> {
        let mut causes = Vec::new();

        if self.service_name.is_empty() {
            causes.push("service name is empty".to_string());
        }
        if self.instance_count == 0 {
            causes.push("instance count must be positive".to_string());
        }
        if self.service_type_name != AGENT_SERVICE_TYPE {
            causes.push(format!("unknown service type {}", self.service_type_name));
        }
        causes
    }
}

/// Handle to a worker created by a cluster manager
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerHandle {
    pub service_name: String,
}

impl WorkerHandle {
    pub fn for_endpoint(endpoint: &AgentEndpoint) -> Self {
        Self {
            service_name: endpoint.service_name.clone(),
        }
    }
}

/// Operations the orchestrator consumes from the cluster manager
#[async_trait]
pub trait ClusterManager: Send + Sync {
    async fn create_worker_process(
        &self,
        descriptor: &WorkerDescriptor,
    ) -> Result<WorkerHandle, ClusterError>;

    async fn delete_worker_process(
        &self,
        handle: &WorkerHandle,
        force: bool,
    ) -> Result<(), ClusterError>;

    async fn query_process_status(
        &self,
        handle: &WorkerHandle,
    ) -> Result<ProcessStatusReport, ClusterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_for_agent() {
        let endpoint = AgentEndpoint::for_agent("stress-app", AgentId::new());
        let descriptor =
            WorkerDescriptor::for_agent("stress-app", &endpoint, Some("NodeType == Load".into()));

        assert_eq!(descriptor.service_name, endpoint.service_name);
        assert_eq!(descriptor.agent_id, endpoint.agent_id);
        assert_eq!(descriptor.instance_count, 1);
        assert!(descriptor.exclusive_process);
        assert_eq!(descriptor.load_metrics[0].name, CPU_CORES_METRIC);
        assert_eq!(descriptor.load_metrics[0].weight, MetricWeight::High);
        assert!(descriptor.validate().is_empty());
    }

    #[test]
    fn test_validate_collects_all_causes() {
        let endpoint = AgentEndpoint::for_agent("stress-app", AgentId::new());
        let mut descriptor = WorkerDescriptor::for_agent("stress-app", &endpoint, None);
        descriptor.instance_count = 0;
        descriptor.service_type_name = "Other".to_string();

        assert_eq!(descriptor.validate().len(), 2);
    }

    #[test]
    fn test_ready_needs_active_and_ok() {
        let active_unknown = ProcessStatusReport {
            status: ServiceStatus::Active,
            health: HealthLookup::State(HealthState::Unknown),
        };
        let creating_ok = ProcessStatusReport {
            status: ServiceStatus::Creating,
            health: HealthLookup::State(HealthState::Ok),
        };
        let active_ok = ProcessStatusReport {
            status: ServiceStatus::Active,
            health: HealthLookup::State(HealthState::Ok),
        };

        assert!(!active_unknown.is_ready());
        assert!(!creating_ok.is_ready());
        assert!(active_ok.is_ready());
    }
}
