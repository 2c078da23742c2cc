//! Orchestrator configuration

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use stress_lib::cluster::ProcessClusterConfig;
use stress_lib::orchestrator::{FailurePolicy, OrchestratorConfig};

/// Where agents run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterBackend {
    /// One `stress-agent` child process per agent
    #[default]
    Process,
    /// Load controllers inside this process
    InProcess,
}

/// Orchestrator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Port for the HTTP API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Application every agent is created under
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Placement hint for the cluster manager
    #[serde(default)]
    pub placement_constraint: Option<String>,

    /// JSON file holding agent records; in memory when unset
    #[serde(default)]
    pub store_path: Option<PathBuf>,

    #[serde(default)]
    pub cluster: ClusterBackend,

    /// Agent binary for the process backend
    #[serde(default = "default_agent_binary")]
    pub agent_binary: PathBuf,

    /// First port handed to a process-backed agent
    #[serde(default = "default_agent_base_port")]
    pub agent_base_port: u16,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_provision_timeout_secs")]
    pub provision_timeout_secs: u64,

    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

fn default_api_port() -> u16 {
    8080
}

fn default_application_name() -> String {
    "stress-fleet".to_string()
}

fn default_agent_binary() -> PathBuf {
    PathBuf::from("stress-agent")
}

fn default_agent_base_port() -> u16 {
    9100
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_provision_timeout_secs() -> u64 {
    15
}

impl ServiceConfig {
    /// Load configuration from an optional `stress.toml` and `STRESS_*` variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("stress").required(false))
            .add_source(config::Environment::with_prefix("STRESS").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            application_name: self.application_name.clone(),
            placement_constraint: self.placement_constraint.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            provision_timeout: Duration::from_secs(self.provision_timeout_secs),
            failure_policy: self.failure_policy,
        }
    }

    pub fn process_cluster(&self) -> ProcessClusterConfig {
        ProcessClusterConfig {
            agent_binary: self.agent_binary.clone(),
            base_port: self.agent_base_port,
            ..Default::default()
        }
    }
}
