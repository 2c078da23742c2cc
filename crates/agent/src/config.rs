//! Agent configuration

use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;
use stress_lib::load::ControlLoopConfig;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Port for the RPC, health and metrics listener
    #[serde(default = "default_port")]
    pub port: u16,

    /// Service name assigned by the cluster manager
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Agent id, set by the process cluster manager as `AGENT_AGENT_ID`
    #[serde(default)]
    pub agent_id: Option<String>,

    /// Length of a CPU burst in seconds
    #[serde(default = "default_burst_secs")]
    pub burst_secs: u64,

    /// Wait between checks while inactive, in milliseconds
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,

    /// CPU workers per burst, one per processor when unset
    #[serde(default)]
    pub workers: Option<usize>,
}

fn default_port() -> u16 {
    9100
}

fn default_service_name() -> String {
    "stress-agent".to_string()
}

fn default_burst_secs() -> u64 {
    60
}

fn default_idle_poll_ms() -> u64 {
    1000
}

impl AgentConfig {
    /// Load configuration from `AGENT_*` environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("AGENT").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn control_loop(&self) -> ControlLoopConfig {
        let defaults = ControlLoopConfig::default();
        ControlLoopConfig {
            burst: Duration::from_secs(self.burst_secs),
            idle_poll: Duration::from_millis(self.idle_poll_ms),
            workers: self.workers.unwrap_or(defaults.workers).max(1),
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_source() {
        let config: AgentConfig = config::Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.port, 9100);
        assert_eq!(config.burst_secs, 60);
        assert_eq!(config.idle_poll_ms, 1000);
        assert!(config.agent_id.is_none());
    }

    #[test]
    fn test_control_loop_overrides() {
        let config: AgentConfig = config::Config::builder()
            .set_override("burst_secs", 5)
            .unwrap()
            .set_override("workers", 2)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        let control = config.control_loop();
        assert_eq!(control.burst, Duration::from_secs(5));
        assert_eq!(control.idle_poll, Duration::from_secs(1));
        assert_eq!(control.workers, 2);
    }

    #[test]
    fn test_identity_passed_by_cluster_manager() {
        let config: AgentConfig = config::Config::builder()
            .set_override("service_name", "stress-fleet/agent_42")
            .unwrap()
            .set_override("agent_id", "5d1c8f0e-2a41-4b7e-9a53-0c6f3d2b9e17")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.service_name, "stress-fleet/agent_42");
        assert_eq!(
            config.agent_id.as_deref(),
            Some("5d1c8f0e-2a41-4b7e-9a53-0c6f3d2b9e17")
        );
    }
}
