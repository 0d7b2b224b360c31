//! Controller API client

use async_trait::async_trait;
use pioneer_core::{endpoints, PioneerError, Result, Task, TaskResult};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Outlasts the controller's long-poll window.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(40);

#[derive(Serialize)]
struct RegisterRequest<'a> {
    hostname: &'a str,
    ip_address: &'a str,
    os: &'a str,
}

#[derive(Deserialize)]
struct RegisterResponse {
    agent_id: String,
}

#[derive(Serialize)]
struct HeartbeatRequest<'a> {
    agent_id: &'a str,
}

#[async_trait]
pub trait ControllerApi: Send + Sync {
    /// Returns the controller-assigned agent id.
    async fn register(&self, hostname: &str, ip_address: &str, os: &str) -> Result<String>;

    async fn heartbeat(&self, agent_id: &str) -> Result<()>;

    /// Long-poll; `None` when the controller had nothing before its deadline.
    async fn fetch_task(&self, agent_id: &str) -> Result<Option<Task>>;

    async fn post_result(&self, result: &TaskResult) -> Result<()>;
}

fn communication(context: &str, err: impl std::fmt::Display) -> PioneerError {
    PioneerError::AgentCommunicationError {
        reason: format!("{}: {}", context, err),
    }
}

async fn unexpected(context: &str, response: reqwest::Response) -> PioneerError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    PioneerError::AgentCommunicationError {
        reason: format!("{} returned {}: {}", context, status, body),
    }
}

pub struct HttpControllerClient {
    client: Client,
    base_url: String,
}

impl HttpControllerClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| communication("building HTTP client", e))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ControllerApi for HttpControllerClient {
    async fn register(&self, hostname: &str, ip_address: &str, os: &str) -> Result<String> {
        let response = self
            .client
            .post(self.url(endpoints::AGENT_REGISTER))
            .json(&RegisterRequest {
                hostname,
                ip_address,
                os,
            })
            .send()
            .await
            .map_err(|e| communication("register", e))?;

        if !matches!(response.status(), StatusCode::OK | StatusCode::CREATED) {
            return Err(unexpected("register", response).await);
        }
        let body: RegisterResponse = response
            .json()
            .await
            .map_err(|e| communication("register response", e))?;
        Ok(body.agent_id)
    }

    async fn heartbeat(&self, agent_id: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url(endpoints::AGENT_HEARTBEAT))
            .json(&HeartbeatRequest { agent_id })
            .send()
            .await
            .map_err(|e| communication("heartbeat", e))?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => Err(PioneerError::AgentNotFound {
                agent_id: agent_id.to_string(),
            }),
            _ => Err(unexpected("heartbeat", response).await),
        }
    }

    async fn fetch_task(&self, agent_id: &str) -> Result<Option<Task>> {
        let response = self
            .client
            .get(self.url(endpoints::AGENT_TASKS))
            .query(&[("agent_id", agent_id)])
            .send()
            .await
            .map_err(|e| communication("fetch task", e))?;

        match response.status() {
            StatusCode::NO_CONTENT => {
                debug!("No task before poll deadline");
                Ok(None)
            }
            StatusCode::OK => response
                .json()
                .await
                .map(Some)
                .map_err(|e| communication("task payload", e)),
            _ => Err(unexpected("fetch task", response).await),
        }
    }

    async fn post_result(&self, result: &TaskResult) -> Result<()> {
        let response = self
            .client
            .post(self.url(endpoints::AGENT_TASK_RESULTS))
            .json(result)
            .send()
            .await
            .map_err(|e| communication("post result", e))?;

        if !response.status().is_success() {
            return Err(unexpected("post result", response).await);
        }
        Ok(())
    }
}
