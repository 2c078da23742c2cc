//! Agent RPC contract
//!
//! Four synchronous calls, each clamping its input and echoing the stored
//! value. Served over HTTP/JSON by the agent; an in-process
//! [`LoadController`](crate::load::LoadController) answers it directly.

mod client;
mod server;

pub use client::{EndpointResolver, HttpAgentClient, HttpAgentConnector};
pub use server::router;

use crate::error::RpcError;
use crate::models::AgentEndpoint;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const MEMORY_TARGET_PATH: &str = "/rpc/memory-target";
pub const CPU_TARGET_PATH: &str = "/rpc/cpu-target";
pub const START_PATH: &str = "/rpc/start";
pub const STOP_PATH: &str = "/rpc/stop";

/// Calls an agent's load controller exposes
#[async_trait]
pub trait AgentRpc: Send + Sync {
    async fn set_memory_allocation_target_in_mb(&self, mb: i32) -> Result<i32, RpcError>;

    async fn set_cpu_target_percentage(&self, percent: i32) -> Result<i32, RpcError>;

    async fn start_stressing(&self) -> Result<bool, RpcError>;

    async fn stop_stressing(&self) -> Result<bool, RpcError>;
}

/// Opens an RPC channel to a running agent
#[async_trait]
pub trait AgentConnector: Send + Sync {
    async fn connect(&self, endpoint: &AgentEndpoint) -> Result<Arc<dyn AgentRpc>, RpcError>;
}

/// Request and response body for the integer-valued calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetValue {
    pub value: i32,
}

/// Response body for start/stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveState {
    pub active: bool,
}
