//! Per-agent resource load controller
//!
//! [`LoadController`] holds the agent's CPU and memory targets and the
//! active flag. The [`ControlLoop`] reads them continuously and drives the
//! memory buffer and the duty-cycled CPU workers.

mod duty_cycle;
mod kernel;
mod r#loop;
mod memory;

pub use duty_cycle::{run_cpu_burst, DutyCycle, DutyCycleStats, DEFAULT_BURST, WINDOW};
pub use kernel::{MandelbrotKernel, DEFAULT_HALF_EXTENT};
pub use memory::{compact_heap, MemoryBuffer, CHUNK_BYTES};
pub use r#loop::{ControlLoop, ControlLoopConfig};

use crate::error::RpcError;
use crate::models::{clamp_cpu_percent, clamp_memory_mb, LoadSnapshot};
use crate::rpc::AgentRpc;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Default)]
struct LoadState {
    cpu_target_percent: AtomicI32,
    memory_target_mb: AtomicI32,
    stressing_active: AtomicBool,
}

/// Thread-safe handle to an agent's load targets
///
/// Clones share state. A fresh controller starts at 0% CPU, 0 MB, inactive.
#[derive(Debug, Clone, Default)]
pub struct LoadController {
    state: Arc<LoadState>,
}

impl LoadController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a memory target clamped into [1, 4096] and return it
    pub fn set_memory_target(&self, mb: i32) -> i32 {
        let target = clamp_memory_mb(mb);
        self.state.memory_target_mb.store(target, Ordering::SeqCst);
        info!(requested = mb, memory_target_mb = target, "Memory target set");
        target
    }

    /// Store a CPU target clamped into [0, 100] and return it
    pub fn set_cpu_target(&self, percent: i32) -> i32 {
        let target = clamp_cpu_percent(percent);
        self.state.cpu_target_percent.store(target, Ordering::SeqCst);
        info!(requested = percent, cpu_target = target, "CPU target set");
        target
    }

    pub fn start(&self) -> bool {
        self.state.stressing_active.store(true, Ordering::SeqCst);
        info!("Stressing started");
        self.is_active()
    }

    pub fn stop(&self) -> bool {
        self.state.stressing_active.store(false, Ordering::SeqCst);
        info!("Stressing stopped");
        self.is_active()
    }

    pub fn is_active(&self) -> bool {
        self.state.stressing_active.load(Ordering::SeqCst)
    }

    pub fn cpu_target(&self) -> i32 {
        self.state.cpu_target_percent.load(Ordering::SeqCst)
    }

    pub fn memory_target_mb(&self) -> i32 {
        self.state.memory_target_mb.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> LoadSnapshot {
        LoadSnapshot {
            cpu_target_percent: self.cpu_target(),
            memory_target_mb: self.memory_target_mb(),
            stressing_active: self.is_active(),
        }
    }
}

/// The controller answers the agent RPC contract directly, which lets
/// in-process agents skip the network.
#[async_trait]
impl AgentRpc for LoadController {
    async fn set_memory_allocation_target_in_mb(&self, mb: i32) -> Result<i32, RpcError> {
        Ok(self.set_memory_target(mb))
    }

    async fn set_cpu_target_percentage(&self, percent: i32) -> Result<i32, RpcError> {
        Ok(self.set_cpu_target(percent))
    }

    async fn start_stressing(&self) -> Result<bool, RpcError> {
        Ok(self.start())
    }

    async fn stop_stressing(&self) -> Result<bool, RpcError> {
        Ok(self.stop())
    }
}
