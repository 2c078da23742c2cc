//! Error types for the orchestrator and its collaborators

use crate::models::AgentId;
use std::time::Duration;

/// Failures reported by a cluster manager
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// Worker creation failed, possibly for several independent reasons
    #[error("failed to create worker {service}: {}", .causes.join("; "))]
    Create {
        service: String,
        causes: Vec<String>,
    },

    /// The worker is not known to the cluster manager
    #[error("worker not found: {0}")]
    NotFound(String),

    /// Health subsystem lookup failed for a reason other than "not yet indexed"
    #[error("health lookup failed for {service}: {reason}")]
    HealthLookup { service: String, reason: String },

    /// Worker deletion failed
    #[error("failed to delete worker {service}: {reason}")]
    Delete { service: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the durable agent mapping
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt record file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Failures talking to an agent over RPC
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("no address known for {0}")]
    Unresolved(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("agent returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Errors surfaced by orchestrator operations
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("agent {agent_id} not healthy after {}s", .waited.as_secs())]
    ProvisionTimeout { agent_id: AgentId, waited: Duration },

    #[error("cluster manager failure: {0}")]
    ClusterManager(#[from] ClusterError),

    #[error("agent {agent_id} unreachable: {source}")]
    Rpc {
        agent_id: AgentId,
        #[source]
        source: RpcError,
    },

    #[error("agent store failure: {0}")]
    Store(#[from] StoreError),

    #[error("operation cancelled")]
    Cancelled,
}

impl OrchestratorError {
    /// Short label used for failure metrics and reports
    pub fn reason(&self) -> &'static str {
        match self {
            OrchestratorError::ProvisionTimeout { .. } => "timeout",
            OrchestratorError::ClusterManager(_) => "cluster_manager",
            OrchestratorError::Rpc { .. } => "rpc",
            OrchestratorError::Store(_) => "store",
            OrchestratorError::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_error_lists_every_cause() {
        let err = ClusterError::Create {
            service: "app/agent_1".to_string(),
            causes: vec!["no capacity".to_string(), "constraint unsatisfied".to_string()],
        };

        let message = err.to_string();
        assert!(message.contains("no capacity"));
        assert!(message.contains("constraint unsatisfied"));
    }

    #[test]
    fn test_timeout_message_reports_seconds() {
        let err = OrchestratorError::ProvisionTimeout {
            agent_id: AgentId::new(),
            waited: Duration::from_secs(15),
        };

        assert!(err.to_string().contains("15s"));
        assert_eq!(err.reason(), "timeout");
    }
}
