// src/models.rs
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::PixelforgeError;

/// Seed value meaning "let the service pick one".
pub const SEED_RANDOM: i64 = -1;

pub const STYLE_KEYS: &[&str] = &[
    "none",
    "photorealistic",
    "anime",
    "digital-art",
    "oil-painting",
    "watercolor",
    "pixel-art",
    "sketch",
];

// Ratio tokens and the pixel dimensions submitted to the provider.
pub const RATIOS: &[(&str, (u32, u32))] = &[
    ("1:1", (1024, 1024)),
    ("16:9", (1344, 768)),
    ("9:16", (768, 1344)),
    ("4:3", (1152, 896)),
    ("3:4", (896, 1152)),
];

pub fn ratio_dimensions(ratio: &str) -> Option<(u32, u32)> {
    RATIOS.iter().find(|(r, _)| *r == ratio).map(|(_, d)| *d)
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default = "default_seed")]
    pub seed: i64,
    #[serde(default = "default_ratio")]
    pub ratio: String,
    #[serde(default)]
    pub enhance: bool,
}

fn default_style() -> String {
    "none".to_string()
}

fn default_seed() -> i64 {
    SEED_RANDOM
}

fn default_ratio() -> String {
    "1:1".to_string()
}

impl GenerateRequest {
    pub fn validate(&self) -> Result<(), PixelforgeError> {
        if self.prompt.trim().is_empty() {
            return Err(PixelforgeError::Validation(
                "prompt must not be empty".to_string(),
            ));
        }
        if !STYLE_KEYS.contains(&self.style.as_str()) {
            return Err(PixelforgeError::Validation(format!(
                "unknown style '{}'",
                self.style
            )));
        }
        if ratio_dimensions(&self.ratio).is_none() {
            return Err(PixelforgeError::Validation(format!(
                "unknown ratio '{}'",
                self.ratio
            )));
        }
        Ok(())
    }

    pub fn dimensions(&self) -> (u32, u32) {
        // Ratio is validated at ingress.
        ratio_dimensions(&self.ratio).unwrap_or((1024, 1024))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateResponse {
    pub image: String,
    pub seed: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveRequest {
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveResponse {
    pub zip: String,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl JobStatus {
    /// Map the provider's wording onto our state machine. Providers are not
    /// consistent across revisions; unknown wording counts as still running
    /// and the poll ceiling bounds the loop.
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "pending" | "queued" | "submitted" | "waiting" => JobStatus::Pending,
            "running" | "processing" | "in_progress" | "generating" => JobStatus::Running,
            "succeeded" | "completed" | "success" | "done" => JobStatus::Succeeded,
            "failed" | "error" => JobStatus::Failed,
            "canceled" | "cancelled" => JobStatus::Canceled,
            _ => JobStatus::Running,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Canceled
        )
    }
}

#[derive(Debug, Clone)]
pub struct ProviderJob {
    pub id: String,
    pub status: JobStatus,
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl ProviderJob {
    pub fn new(id: String, status: JobStatus) -> Self {
        Self {
            id,
            status,
            error: None,
            submitted_at: Utc::now(),
        }
    }

    pub fn update(&mut self, status: JobStatus, error: Option<String>) {
        self.status = status;
        if error.is_some() {
            self.error = error;
        }
    }
}

#[derive(Debug, Clone)]
pub struct Artifact {
    pub data: Bytes,
    pub seed: i64,
}
