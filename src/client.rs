//! HTTP client for the job control API, used by the `jobs` CLI subcommand.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::{api::control_key::CONTROL_KEY_HEADER, config::ControlConfig, jobs::JobSummary};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Server responded with {status}: {message}")]
    Status { status: StatusCode, message: String },
}

impl ClientError {
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Transport(err) => err.status(),
            Self::Status { status, .. } => Some(*status),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Clone)]
pub struct ControlClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ControlClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &ControlConfig) -> Result<Self, ClientError> {
        Self::new(config.url.clone(), config.api_key.clone())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        self.client
            .request(method, url)
            .header(CONTROL_KEY_HEADER, &self.api_key)
    }

    async fn send(request: RequestBuilder) -> Result<reqwest::Response, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .map_or_else(|_| status.to_string(), |body| body.error);
        Err(ClientError::Status { status, message })
    }

    async fn action(&self, name: &str, action: &str) -> Result<(), ClientError> {
        Self::send(self.request(Method::POST, &format!("/api/jobs/{name}/{action}"))).await?;
        Ok(())
    }

    pub async fn get_all(&self) -> Result<Vec<JobSummary>, ClientError> {
        Ok(Self::send(self.request(Method::GET, "/api/jobs"))
            .await?
            .json()
            .await?)
    }

    pub async fn start(&self, name: &str) -> Result<(), ClientError> {
        self.action(name, "start").await
    }

    pub async fn trigger(&self, name: &str) -> Result<(), ClientError> {
        self.action(name, "trigger").await
    }

    pub async fn stop(&self, name: &str) -> Result<(), ClientError> {
        self.action(name, "stop").await
    }

    pub async fn enable(&self, name: &str) -> Result<(), ClientError> {
        self.action(name, "enable").await
    }

    pub async fn disable(&self, name: &str) -> Result<(), ClientError> {
        self.action(name, "disable").await
    }

    pub async fn update_interval(&self, name: &str, cron: &str) -> Result<(), ClientError> {
        let request = self
            .request(Method::PUT, &format!("/api/jobs/{name}/interval"))
            .json(&json!({ "cron": cron }));
        Self::send(request).await?;
        Ok(())
    }
}
