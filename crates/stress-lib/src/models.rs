//! Core data models shared by the orchestrator and the agents

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lowest CPU target an agent accepts (percent)
pub const MIN_CPU_PERCENT: i32 = 0;
/// Highest CPU target an agent accepts (percent)
pub const MAX_CPU_PERCENT: i32 = 100;
/// Lowest memory target an agent accepts (MB)
pub const MIN_MEMORY_MB: i32 = 1;
/// Highest memory target an agent accepts (MB)
pub const MAX_MEMORY_MB: i32 = 4096;

/// Clamp a CPU percentage into [0, 100]
pub fn clamp_cpu_percent(percent: i32) -> i32 {
    percent.clamp(MIN_CPU_PERCENT, MAX_CPU_PERCENT)
}

/// Clamp a memory target into [1, 4096]
///
/// Zero and negative inputs map to 1 so an agent always keeps a minimum footprint.
pub fn clamp_memory_mb(mb: i32) -> i32 {
    mb.clamp(MIN_MEMORY_MB, MAX_MEMORY_MB)
}

/// Unique identifier of a provisioned agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for AgentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Request to provision a batch of stress agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StressRequest {
    #[serde(rename = "cpuTarget")]
    pub cpu_target: i32,
    #[serde(rename = "memoryTarget")]
    pub memory_target_mb: i32,
    #[serde(rename = "isActive")]
    pub active: bool,
    #[serde(rename = "numberOfAgentsToCreate")]
    pub agent_count: u32,
}

impl StressRequest {
    /// Return a copy with CPU and memory targets clamped to the accepted ranges
    pub fn clamped(&self) -> Self {
        Self {
            cpu_target: clamp_cpu_percent(self.cpu_target),
            memory_target_mb: clamp_memory_mb(self.memory_target_mb),
            ..*self
        }
    }
}

/// Tracking record for one provisioned agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: AgentId,
    pub request: StressRequest,
    pub created_at: DateTime<Utc>,
}

impl AgentRecord {
    pub fn new(agent_id: AgentId, request: StressRequest) -> Self {
        Self {
            agent_id,
            request,
            created_at: Utc::now(),
        }
    }
}

/// Addressable identity of a running agent, derived from its id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgentEndpoint {
    pub agent_id: AgentId,
    pub service_name: String,
}

impl AgentEndpoint {
    pub fn for_agent(application_name: &str, agent_id: AgentId) -> Self {
        Self {
            agent_id,
            service_name: format!("{}/agent_{}", application_name, agent_id),
        }
    }
}

/// Coarse state of an agent's control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadPhase {
    Starting,
    Deactivated,
    AllocatingMemory,
    StressCpu,
}

impl LoadPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadPhase::Starting => "Starting",
            LoadPhase::Deactivated => "Deactivated",
            LoadPhase::AllocatingMemory => "Allocating Memory",
            LoadPhase::StressCpu => "StressCPU",
        }
    }
}

impl fmt::Display for LoadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of an agent's load targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSnapshot {
    pub cpu_target_percent: i32,
    pub memory_target_mb: i32,
    pub stressing_active: bool,
}
