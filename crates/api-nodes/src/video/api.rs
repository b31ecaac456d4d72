//! Remote video-generation API
//!
//! [`VideoApi`] is the seam between the node and the service: submit a job,
//! query its status, download the result. [`HttpVideoApi`] talks to the
//! real service.

use crate::error::{ApiNodeError, Result};
use async_trait::async_trait;
use ck_nodes_core::SharedNetworkConfig;
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

pub const DEFAULT_BASE_URL: &str = "https://ai.t8star.cn";
pub const GENERATIONS_PATH: &str = "/v2/videos/generations";
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Submission body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: String,
    pub enhance_prompt: bool,
    pub aspect_ratio: String,
    /// Sent only when positive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    /// PNG data URLs of the reference frames
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    /// Sent only when enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_upsample: Option<bool>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            enhance_prompt: false,
            aspect_ratio: "16:9".to_string(),
            seed: None,
            images: Vec::new(),
            enable_upsample: None,
        }
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = (seed > 0).then_some(seed);
        self
    }

    pub fn with_upsample(mut self, enable: bool) -> Self {
        self.enable_upsample = enable.then_some(true);
        self
    }
}

/// Job status as reported by the service
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    Succeeded { video_url: String },
    Failed { reason: String },
    /// Any other status string, e.g. `SUBMITTED` or `IN_PROGRESS`
    Pending(String),
}

impl TaskStatus {
    /// Interpret a status response body
    pub fn from_response(body: &Value) -> Result<Self> {
        let status = body.get("status").and_then(Value::as_str).unwrap_or_default();
        match status {
            "SUCCESS" => body
                .get("data")
                .and_then(|data| data.get("output"))
                .and_then(Value::as_str)
                .filter(|url| !url.is_empty())
                .map(|url| TaskStatus::Succeeded {
                    video_url: url.to_string(),
                })
                .ok_or_else(|| ApiNodeError::Request("SUCCESS without data.output".to_string())),
            "FAILURE" => Ok(TaskStatus::Failed {
                reason: body
                    .get("fail_reason")
                    .and_then(Value::as_str)
                    .filter(|reason| !reason.is_empty())
                    .unwrap_or("Generation failed")
                    .to_string(),
            }),
            other => Ok(TaskStatus::Pending(other.to_string())),
        }
    }
}

#[async_trait]
pub trait VideoApi: Send + Sync {
    /// Submit a job, returning its task id
    async fn submit(&self, api_key: &str, request: &GenerationRequest) -> Result<String>;

    /// Current status of `task_id`
    async fn status(&self, api_key: &str, task_id: &str) -> Result<TaskStatus>;

    /// Stream `url` into `dest`, returning the number of bytes written
    async fn download(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// [`VideoApi`] over HTTPS
pub struct HttpVideoApi {
    base_url: String,
    network: SharedNetworkConfig,
    submit_timeout: Duration,
}

impl HttpVideoApi {
    pub fn new(base_url: impl Into<String>, network: SharedNetworkConfig) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            network,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
        }
    }

    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn client(&self, timeout: Option<Duration>) -> Result<reqwest::Client> {
        Ok(self.network.read().http_client(timeout)?)
    }
}

#[async_trait]
impl VideoApi for HttpVideoApi {
    async fn submit(&self, api_key: &str, request: &GenerationRequest) -> Result<String> {
        let url = format!("{}{}", self.base_url, GENERATIONS_PATH);
        let client = self.client(Some(self.submit_timeout))?;

        tracing::info!(model = %request.model, images = request.images.len(), "Submitting video generation");

        let response = client
            .post(&url)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ApiNodeError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiNodeError::Request(e.to_string()))?;

        if status != reqwest::StatusCode::OK {
            return Err(ApiNodeError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value =
            serde_json::from_str(&body).map_err(|e| ApiNodeError::Request(e.to_string()))?;
        match json.get("task_id") {
            Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
            Some(Value::Number(id)) => Ok(id.to_string()),
            _ => Err(ApiNodeError::NoTaskId),
        }
    }

    async fn status(&self, api_key: &str, task_id: &str) -> Result<TaskStatus> {
        let url = format!("{}{}/{}", self.base_url, GENERATIONS_PATH, task_id);
        let client = self.client(None)?;

        let response = client
            .get(&url)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| ApiNodeError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiNodeError::Request(format!("status query returned {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ApiNodeError::Request(e.to_string()))?;
        TaskStatus::from_response(&body)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let client = self
            .client(None)
            .map_err(|e| ApiNodeError::Download(e.to_string()))?;

        let response = client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ApiNodeError::Download(e.to_string()))?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| ApiNodeError::Download(e.to_string()))?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ApiNodeError::Download(e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| ApiNodeError::Download(e.to_string()))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| ApiNodeError::Download(e.to_string()))?;

        tracing::info!(path = %dest.display(), bytes = written, "Video downloaded");
        Ok(written)
    }
}
