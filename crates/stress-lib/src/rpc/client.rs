//! HTTP client side of the agent RPC contract

use super::{
    ActiveState, AgentConnector, AgentRpc, TargetValue, CPU_TARGET_PATH, MEMORY_TARGET_PATH,
    START_PATH, STOP_PATH,
};
use crate::error::RpcError;
use crate::models::AgentEndpoint;
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maps an agent's service name to the base URL of its RPC listener
pub trait EndpointResolver: Send + Sync {
    fn resolve(&self, endpoint: &AgentEndpoint) -> Option<String>;
}

/// RPC client bound to one agent
pub struct HttpAgentClient {
    client: Client,
    base_url: String,
}

impl HttpAgentClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<B, T>(&self, path: &str, body: Option<&B>) -> Result<T, RpcError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Agent RPC call");

        let mut request = self.client.post(&url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::Status { status, body });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl AgentRpc for HttpAgentClient {
    async fn set_memory_allocation_target_in_mb(&self, mb: i32) -> Result<i32, RpcError> {
        let reply: TargetValue = self
            .call(MEMORY_TARGET_PATH, Some(&TargetValue { value: mb }))
            .await?;
        Ok(reply.value)
    }

    async fn set_cpu_target_percentage(&self, percent: i32) -> Result<i32, RpcError> {
        let reply: TargetValue = self
            .call(CPU_TARGET_PATH, Some(&TargetValue { value: percent }))
            .await?;
        Ok(reply.value)
    }

    async fn start_stressing(&self) -> Result<bool, RpcError> {
        let reply: ActiveState = self.call::<(), _>(START_PATH, None).await?;
        Ok(reply.active)
    }

    async fn stop_stressing(&self) -> Result<bool, RpcError> {
        let reply: ActiveState = self.call::<(), _>(STOP_PATH, None).await?;
        Ok(reply.active)
    }
}

/// Connector that resolves agents to HTTP base URLs
pub struct HttpAgentConnector {
    client: Client,
    resolver: Arc<dyn EndpointResolver>,
}

impl HttpAgentConnector {
    pub fn new(resolver: Arc<dyn EndpointResolver>) -> Result<Self, RpcError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, resolver })
    }
}

#[async_trait]
impl AgentConnector for HttpAgentConnector {
    async fn connect(&self, endpoint: &AgentEndpoint) -> Result<Arc<dyn AgentRpc>, RpcError> {
        let base_url = self
            .resolver
            .resolve(endpoint)
            .ok_or_else(|| RpcError::Unresolved(endpoint.service_name.clone()))?;

        Ok(Arc::new(HttpAgentClient::new(self.client.clone(), base_url)))
    }
}
