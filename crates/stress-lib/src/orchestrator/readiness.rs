//! Bounded wait for a new worker to become active and healthy

use crate::clock::Clock;
use crate::cluster::{ClusterManager, HealthLookup, WorkerHandle};
use crate::error::OrchestratorError;
use crate::models::AgentId;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Poll cadence and deadline for the readiness wait
#[derive(Debug, Clone, Copy)]
pub struct ReadinessPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            timeout: Duration::from_secs(15),
        }
    }
}

/// Poll the cluster manager until the worker is Active with Ok health
///
/// Returns the number of polls it took. A health lookup that has not yet
/// indexed the worker keeps the loop going; any other lookup error ends it.
pub async fn wait_until_ready(
    cluster: &dyn ClusterManager,
    clock: &dyn Clock,
    handle: &WorkerHandle,
    agent_id: AgentId,
    policy: ReadinessPolicy,
    cancel: &CancellationToken,
) -> Result<u32, OrchestratorError> {
    let started = clock.now();
    let mut polls = 0u32;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Err(OrchestratorError::Cancelled),
            _ = clock.sleep(policy.poll_interval) => {}
        }
        polls += 1;

        let report = cluster.query_process_status(handle).await?;
        if report.is_ready() {
            debug!(agent_id = %agent_id, polls = polls, "Worker ready");
            return Ok(polls);
        }

        match report.health {
            HealthLookup::NotIndexed => {
                debug!(agent_id = %agent_id, "Worker health not indexed yet");
            }
            HealthLookup::State(health) => {
                debug!(
                    agent_id = %agent_id,
                    status = ?report.status,
                    health = ?health,
                    "Worker not ready"
                );
            }
        }

        let waited = clock.now() - started;
        if waited >= policy.timeout {
            return Err(OrchestratorError::ProvisionTimeout { agent_id, waited });
        }
    }
}
