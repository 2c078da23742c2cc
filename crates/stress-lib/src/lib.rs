//! Library for provisioning and driving stress agents
//!
//! This crate provides the core functionality for:
//! - Orchestrating agent batches (create, health-gate, configure, delete)
//! - Generating CPU and memory load inside an agent
//! - Cluster manager, RPC and durable store collaborators
//! - Health checks and observability

pub mod clock;
pub mod cluster;
pub mod error;
pub mod health;
pub mod load;
pub mod models;
pub mod observability;
pub mod ops;
pub mod orchestrator;
pub mod rpc;
pub mod store;

pub use error::{ClusterError, OrchestratorError, RpcError, StoreError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{StressMetrics, StructuredLogger};
pub use orchestrator::{
    CreateReport, FailurePolicy, Orchestrator, OrchestratorBuilder, OrchestratorConfig,
};
