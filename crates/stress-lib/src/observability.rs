//! Observability infrastructure
//!
//! Provides:
//! - Prometheus metrics for provisioning and per-agent load
//! - Structured JSON logging with tracing

use crate::models::{AgentId, LoadPhase, LoadSnapshot, StressRequest};
use prometheus::{
    register_gauge, register_gauge_vec, register_histogram, register_int_counter,
    register_int_counter_vec, register_int_gauge, Gauge, GaugeVec, Histogram, IntCounter,
    IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for provisioning latency (in seconds)
const PROVISION_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 15.0, 30.0];

/// Histogram buckets for single remote calls (in seconds)
const CALL_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0];

static GLOBAL_METRICS: OnceLock<StressMetricsInner> = OnceLock::new();

struct StressMetricsInner {
    provision_latency_seconds: Histogram,
    create_call_latency_seconds: Histogram,
    agents_created: IntCounter,
    agents_deleted: IntCounter,
    provision_failures: IntCounterVec,
    agents_tracked: IntGauge,
    memory_buffer_bytes: IntGauge,
    cpu_bursts: IntCounter,
    cpu_busy_ratio: Gauge,
    load_targets: GaugeVec,
}

impl StressMetricsInner {
    fn new() -> Self {
        Self {
            provision_latency_seconds: register_histogram!(
                "stress_provision_latency_seconds",
                "Time from record write until an agent is configured",
                PROVISION_BUCKETS.to_vec()
            )
            .expect("Failed to register provision_latency_seconds"),

            create_call_latency_seconds: register_histogram!(
                "stress_create_call_latency_seconds",
                "Duration of cluster manager create calls",
                CALL_BUCKETS.to_vec()
            )
            .expect("Failed to register create_call_latency_seconds"),

            agents_created: register_int_counter!(
                "stress_agents_created_total",
                "Agents provisioned and configured"
            )
            .expect("Failed to register agents_created"),

            agents_deleted: register_int_counter!(
                "stress_agents_deleted_total",
                "Agent records removed during teardown"
            )
            .expect("Failed to register agents_deleted"),

            provision_failures: register_int_counter_vec!(
                "stress_provision_failures_total",
                "Agents that failed to provision, by reason",
                &["reason"]
            )
            .expect("Failed to register provision_failures"),

            agents_tracked: register_int_gauge!(
                "stress_agents_tracked",
                "Agent records currently in the durable mapping"
            )
            .expect("Failed to register agents_tracked"),

            memory_buffer_bytes: register_int_gauge!(
                "stress_agent_memory_buffer_bytes",
                "Bytes currently held by the agent's memory buffer"
            )
            .expect("Failed to register memory_buffer_bytes"),

            cpu_bursts: register_int_counter!(
                "stress_agent_cpu_bursts_total",
                "CPU bursts completed by the agent"
            )
            .expect("Failed to register cpu_bursts"),

            cpu_busy_ratio: register_gauge!(
                "stress_agent_cpu_busy_ratio",
                "Busy fraction observed during the last CPU burst"
            )
            .expect("Failed to register cpu_busy_ratio"),

            load_targets: register_gauge_vec!(
                "stress_agent_load_targets",
                "Current load targets of the agent",
                &["target"]
            )
            .expect("Failed to register load_targets"),
        }
    }
}

/// Lightweight handle to the process-wide metrics
///
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct StressMetrics {
    _private: (),
}

impl Default for StressMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl StressMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(StressMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &StressMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_provision_latency(&self, duration_secs: f64) {
        self.inner().provision_latency_seconds.observe(duration_secs);
    }

    pub fn observe_create_call_latency(&self, duration_secs: f64) {
        self.inner().create_call_latency_seconds.observe(duration_secs);
    }

    pub fn inc_agents_created(&self) {
        self.inner().agents_created.inc();
    }

    pub fn inc_agents_deleted(&self, count: u64) {
        self.inner().agents_deleted.inc_by(count);
    }

    pub fn inc_provision_failures(&self, reason: &str) {
        self.inner()
            .provision_failures
            .with_label_values(&[reason])
            .inc();
    }

    pub fn set_agents_tracked(&self, count: i64) {
        self.inner().agents_tracked.set(count);
    }

    pub fn set_memory_buffer_bytes(&self, bytes: usize) {
        self.inner().memory_buffer_bytes.set(bytes as i64);
    }

    pub fn record_cpu_burst(&self, busy_ratio: f64) {
        self.inner().cpu_bursts.inc();
        self.inner().cpu_busy_ratio.set(busy_ratio);
    }

    pub fn set_load_targets(&self, snapshot: &LoadSnapshot) {
        let targets = &self.inner().load_targets;
        targets
            .with_label_values(&["cpu_percent"])
            .set(snapshot.cpu_target_percent as f64);
        targets
            .with_label_values(&["memory_mb"])
            .set(snapshot.memory_target_mb as f64);
        targets
            .with_label_values(&["active"])
            .set(if snapshot.stressing_active { 1.0 } else { 0.0 });
    }
}

/// Structured logger for orchestrator and agent events
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_startup(&self, version: &str) {
        info!(
            event = "service_started",
            service = %self.service,
            version = %version,
            "Service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Service shutting down"
        );
    }

    pub fn log_agent_created(&self, agent_id: AgentId, request: &StressRequest, elapsed_ms: u128) {
        info!(
            event = "agent_created",
            service = %self.service,
            agent_id = %agent_id,
            cpu_target = request.cpu_target,
            memory_target_mb = request.memory_target_mb,
            active = request.active,
            elapsed_ms = elapsed_ms,
            "Agent provisioned and configured"
        );
    }

    pub fn log_agent_configured(&self, agent_id: AgentId, applied: &LoadSnapshot) {
        info!(
            event = "agent_configured",
            service = %self.service,
            agent_id = %agent_id,
            cpu_target = applied.cpu_target_percent,
            memory_target_mb = applied.memory_target_mb,
            active = applied.stressing_active,
            "Agent accepted load targets"
        );
    }

    /// Log a failed create call, one field per cause
    pub fn log_create_failure(&self, service_name: &str, causes: &[String]) {
        for (index, cause) in causes.iter().enumerate() {
            warn!(
                event = "create_worker_failed",
                service = %self.service,
                worker = %service_name,
                cause_index = index + 1,
                cause = %cause,
                "Cluster manager rejected worker creation"
            );
        }
    }

    pub fn log_provision_failure(&self, agent_id: AgentId, reason: &str, details: &str) {
        warn!(
            event = "provision_failed",
            service = %self.service,
            agent_id = %agent_id,
            reason = %reason,
            details = %details,
            "Agent provisioning failed"
        );
    }

    pub fn log_agent_deleted(&self, agent_id: AgentId, process_deleted: bool) {
        if process_deleted {
            info!(
                event = "agent_deleted",
                service = %self.service,
                agent_id = %agent_id,
                "Agent record removed and worker deleted"
            );
        } else {
            warn!(
                event = "agent_deleted",
                service = %self.service,
                agent_id = %agent_id,
                "Agent record removed, worker deletion failed"
            );
        }
    }

    pub fn log_load_state(&self, snapshot: &LoadSnapshot, phase: LoadPhase) {
        info!(
            event = "load_state",
            service = %self.service,
            cpu_target = snapshot.cpu_target_percent,
            memory_target_mb = snapshot.memory_target_mb,
            active = snapshot.stressing_active,
            state = %phase,
            "Load state changed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handles_share_registry() {
        let metrics = StressMetrics::new();
        let other = metrics.clone();

        metrics.observe_provision_latency(0.4);
        metrics.inc_agents_created();
        other.inc_provision_failures("timeout");
        other.set_memory_buffer_bytes(350 * 1024);
        other.set_load_targets(&LoadSnapshot {
            cpu_target_percent: 40,
            memory_target_mb: 128,
            stressing_active: true,
        });

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "stress_provision_failures_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("stress-orchestrator");
        assert_eq!(logger.service, "stress-orchestrator");
    }
}
