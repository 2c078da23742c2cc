//! API client for communicating with the stress orchestrator

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Failures reported by the orchestrator API
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API error ({status}): {body}")]
    Status { status: StatusCode, body: String },
}

/// API client for the orchestrator
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            // Provisioning waits on every agent's health gate
            .timeout(std::time::Duration::from_secs(600))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    /// Make a DELETE request
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .delete(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    /// Create agents; a batch with failures comes back as a report
    pub async fn create_agents(&self, request: &StressRequest) -> Result<CreateOutcome> {
        let url = self.base_url.join("api/stress").context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .context("Failed to send request")?;

        if response.status() == StatusCode::INTERNAL_SERVER_ERROR {
            let body = response.text().await.unwrap_or_default();
            return match serde_json::from_str::<CreateReport>(&body) {
                Ok(report) => Ok(CreateOutcome::Partial(report)),
                Err(_) => Err(ApiError::Status {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body,
                }
                .into()),
            };
        }

        Ok(CreateOutcome::Created(Self::parse(response).await?))
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, body }.into());
        }

        response.json().await.context("Failed to parse response")
    }
}

// API request and response types

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StressRequest {
    pub cpu_target: i32,
    pub memory_target: i32,
    pub number_of_agents_to_create: u32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentFailure {
    pub agent_id: String,
    pub reason: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReport {
    pub created: Vec<String>,
    pub failures: Vec<AgentFailure>,
}

#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(Vec<String>),
    Partial(CreateReport),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: String,
    pub request: StressRequest,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteAllResponse {
    pub deleted: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub agent_id: String,
    pub deleted: bool,
}
