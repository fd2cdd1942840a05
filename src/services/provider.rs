// src/services/provider.rs
use async_trait::async_trait;
use bytes::Bytes;
use log::warn;
use serde_json::Value;
use std::time::Duration;

use crate::config::ProviderConfig;
use crate::errors::PixelforgeError;

// Submission, each poll query, and artifact fetch carry their own timeout;
// the poll loop's attempt ceiling is enforced separately by the caller.
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_TIMEOUT: Duration = Duration::from_secs(10);
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

const ERROR_BODY_LIMIT: usize = 300;

#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Submit a generation job. Returns the provider's raw response body.
    async fn submit(&self, body: &Value) -> Result<Value, PixelforgeError>;

    /// Query the status of an asynchronous job. `Ok(None)` signals a
    /// transient per-query failure the caller should skip over.
    async fn poll(&self, job_id: &str) -> Result<Option<Value>, PixelforgeError>;

    /// Retrieve the bytes behind an artifact URL.
    async fn fetch(&self, url: &str) -> Result<Bytes, PixelforgeError>;
}

pub struct HttpImageProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpImageProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, PixelforgeError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            PixelforgeError::Configuration("PROVIDER_API_KEY is not set".to_string())
        })?;

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| PixelforgeError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl ImageProvider for HttpImageProvider {
    async fn submit(&self, body: &Value) -> Result<Value, PixelforgeError> {
        let response = self
            .client
            .post(format!("{}/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(SUBMIT_TIMEOUT)
            .json(body)
            .send()
            .await
            .map_err(|e| map_transport("job submission", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PixelforgeError::Submission {
                status: status.as_u16(),
                body: truncate(&body),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| PixelforgeError::Transport(format!("job submission: {e}")))
    }

    async fn poll(&self, job_id: &str) -> Result<Option<Value>, PixelforgeError> {
        let result = self
            .client
            .get(format!("{}/jobs/{}", self.base_url, job_id))
            .bearer_auth(&self.api_key)
            .timeout(POLL_TIMEOUT)
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Err(PixelforgeError::UpstreamTimeout(format!(
                    "status poll for job {job_id}"
                )));
            }
            // Connection-level hiccups on an individual poll are expected;
            // the attempt ceiling bounds how long we keep trying.
            Err(e) => {
                warn!("Transient poll error for job {}: {}", job_id, e);
                return Ok(None);
            }
        };

        if !response.status().is_success() {
            warn!(
                "Transient poll status {} for job {}",
                response.status(),
                job_id
            );
            return Ok(None);
        }

        match response.json::<Value>().await {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Unreadable poll body for job {}: {}", job_id, e);
                Ok(None)
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<Bytes, PixelforgeError> {
        let response = self
            .client
            .get(url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| map_transport("artifact fetch", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PixelforgeError::ArtifactFetch {
                status: status.as_u16(),
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| PixelforgeError::Transport(format!("artifact fetch: {e}")))
    }
}

fn map_transport(context: &str, e: reqwest::Error) -> PixelforgeError {
    if e.is_timeout() {
        PixelforgeError::UpstreamTimeout(context.to_string())
    } else {
        PixelforgeError::Transport(format!("{context}: {e}"))
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= ERROR_BODY_LIMIT {
        body.to_string()
    } else {
        body.chars().take(ERROR_BODY_LIMIT).collect()
    }
}
