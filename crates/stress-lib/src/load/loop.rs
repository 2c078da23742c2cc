//! Agent control loop
//!
//! Alternates a memory phase and a CPU phase while stressing is active,
//! and idles with the buffer released while it is not.

use super::duty_cycle::{run_cpu_burst, DutyCycle, DEFAULT_BURST};
use super::kernel::MandelbrotKernel;
use super::memory::{compact_heap, MemoryBuffer};
use super::LoadController;
use crate::health::{components, ComponentHealth, HealthRegistry};
use crate::models::{LoadPhase, LoadSnapshot};
use crate::observability::{StressMetrics, StructuredLogger};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Configuration for the agent control loop
#[derive(Debug, Clone)]
pub struct ControlLoopConfig {
    /// Length of each CPU burst (default: 60 seconds)
    pub burst: Duration,
    /// Wait between checks while inactive (default: 1 second)
    pub idle_poll: Duration,
    /// Parallel CPU workers (default: one per processor)
    pub workers: usize,
    pub kernel: MandelbrotKernel,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            burst: DEFAULT_BURST,
            idle_poll: Duration::from_secs(1),
            workers: num_cpus::get(),
            kernel: MandelbrotKernel::default(),
        }
    }
}

pub struct ControlLoop {
    controller: LoadController,
    health: HealthRegistry,
    metrics: StressMetrics,
    logger: StructuredLogger,
    config: ControlLoopConfig,
    buffer: MemoryBuffer,
    reported: Option<(LoadPhase, LoadSnapshot)>,
}

impl ControlLoop {
    pub fn new(
        controller: LoadController,
        health: HealthRegistry,
        logger: StructuredLogger,
        config: ControlLoopConfig,
    ) -> Self {
        Self {
            controller,
            health,
            metrics: StressMetrics::new(),
            logger,
            config,
            buffer: MemoryBuffer::new(),
            reported: None,
        }
    }

    /// Run until `cancel` fires
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            workers = self.config.workers,
            burst_secs = self.config.burst.as_secs(),
            "Starting load control loop"
        );
        self.report(LoadPhase::Starting).await;

        while self.step(&cancel).await {}

        self.buffer.clear();
        self.metrics.set_memory_buffer_bytes(0);
        info!("Load control loop stopped");
    }

    /// One outer iteration. Returns false once cancelled.
    async fn step(&mut self, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }

        if !self.controller.is_active() {
            if !self.buffer.is_empty() {
                self.release_memory();
            }
            self.report(LoadPhase::Deactivated).await;

            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(self.config.idle_poll) => {}
            }
            return true;
        }

        compact_heap();

        if !self.fill_memory(cancel).await {
            return false;
        }

        if self.buffer.overshoots(self.controller.memory_target_mb()) {
            debug!(
                held_bytes = self.buffer.len_bytes(),
                "Memory target lowered, resetting buffer"
            );
            self.release_memory();
        }

        self.report(LoadPhase::StressCpu).await;

        let controller = self.controller.clone();
        let stats = run_cpu_burst(
            DutyCycle::new(self.controller.cpu_target(), self.config.burst),
            self.config.kernel,
            self.config.workers,
            move || controller.is_active(),
            cancel,
        )
        .await;

        self.metrics.record_cpu_burst(stats.busy_ratio());
        debug!(
            windows = stats.windows,
            work_units = stats.work_units,
            busy_ratio = stats.busy_ratio(),
            "CPU burst complete"
        );

        !cancel.is_cancelled()
    }

    /// Grow the buffer toward the live memory target. Returns false if cancelled.
    async fn fill_memory(&mut self, cancel: &CancellationToken) -> bool {
        while self.buffer.needs_growth(self.controller.memory_target_mb()) {
            if cancel.is_cancelled() {
                return false;
            }
            self.report(LoadPhase::AllocatingMemory).await;

            self.buffer.grow_chunk();
            self.metrics.set_memory_buffer_bytes(self.buffer.len_bytes());
            tokio::task::yield_now().await;
        }
        true
    }

    fn release_memory(&mut self) {
        self.buffer.clear();
        compact_heap();
        self.metrics.set_memory_buffer_bytes(0);
    }

    /// Publish the load profile to the health registry; log on change
    async fn report(&mut self, phase: LoadPhase) {
        let snapshot = self.controller.snapshot();

        if self.reported != Some((phase, snapshot)) {
            self.logger.log_load_state(&snapshot, phase);
            self.metrics.set_load_targets(&snapshot);
            self.reported = Some((phase, snapshot));

            let profile = format!(
                "Cpu: {}, Mem: {}, State: {}",
                snapshot.cpu_target_percent, snapshot.memory_target_mb, phase
            );
            self.health
                .update(components::LOAD_PROFILE, ComponentHealth::healthy_with(profile))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_loop(controller: &LoadController) -> (ControlLoop, HealthRegistry) {
        let health = HealthRegistry::new();
        let config = ControlLoopConfig {
            burst: Duration::from_millis(50),
            idle_poll: Duration::from_millis(10),
            workers: 1,
            kernel: MandelbrotKernel::new(0.05),
        };
        let control = ControlLoop::new(
            controller.clone(),
            health.clone(),
            StructuredLogger::new("test-agent"),
            config,
        );
        (control, health)
    }

    async fn profile(health: &HealthRegistry) -> String {
        health
            .message(components::LOAD_PROFILE)
            .await
            .unwrap_or_default()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_inactive_step_reports_deactivated() {
        let controller = LoadController::new();
        let (mut control, health) = test_loop(&controller);
        let cancel = CancellationToken::new();

        assert!(control.step(&cancel).await);
        assert!(control.buffer.is_empty());
        assert!(profile(&health).await.contains("State: Deactivated"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_active_step_fills_memory_then_stresses_cpu() {
        let controller = LoadController::new();
        controller.set_memory_target(2);
        controller.set_cpu_target(30);
        controller.start();
        let (mut control, health) = test_loop(&controller);
        let cancel = CancellationToken::new();

        assert!(control.step(&cancel).await);

        assert_eq!(control.buffer.chunk_count(), MemoryBuffer::chunks_for(2));
        assert_eq!(profile(&health).await, "Cpu: 30, Mem: 2, State: StressCPU");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_lowered_target_resets_buffer_to_zero() {
        let controller = LoadController::new();
        controller.set_memory_target(3);
        controller.start();
        let (mut control, _health) = test_loop(&controller);
        let cancel = CancellationToken::new();

        assert!(control.step(&cancel).await);
        assert_eq!(control.buffer.chunk_count(), MemoryBuffer::chunks_for(3));

        controller.set_memory_target(1);
        assert!(control.step(&cancel).await);
        assert!(control.buffer.is_empty());

        // Growth restarts from zero on the following cycle
        assert!(control.step(&cancel).await);
        assert_eq!(control.buffer.chunk_count(), MemoryBuffer::chunks_for(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_releases_memory() {
        let controller = LoadController::new();
        controller.set_memory_target(1);
        controller.start();
        let (mut control, health) = test_loop(&controller);
        let cancel = CancellationToken::new();

        assert!(control.step(&cancel).await);
        assert!(!control.buffer.is_empty());

        controller.stop();
        assert!(control.step(&cancel).await);
        assert!(control.buffer.is_empty());
        assert!(profile(&health).await.contains("Deactivated"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_exits_on_cancel() {
        let controller = LoadController::new();
        controller.set_memory_target(1);
        controller.set_cpu_target(50);
        controller.start();
        let (control, _health) = test_loop(&controller);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(control.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(120)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("control loop should stop promptly")
            .unwrap();
    }
}
