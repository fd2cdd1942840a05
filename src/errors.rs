// src/errors.rs
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PixelforgeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Provider rejected job submission ({status}): {body}")]
    Submission { status: u16, body: String },

    #[error("Provider response carried neither an artifact nor a job id")]
    UnrecognizedResponse,

    #[error("Provider reported job failure: {0}")]
    ProviderJobFailed(String),

    #[error("Provider reported success but no artifact could be extracted")]
    ArtifactMissing,

    #[error("Failed to fetch artifact ({status})")]
    ArtifactFetch { status: u16 },

    #[error("Job did not reach a terminal state within {attempts} polls")]
    PollTimeout { attempts: u32 },

    #[error("Upstream request timed out: {0}")]
    UpstreamTimeout(String),

    #[error("Upstream request failed: {0}")]
    Transport(String),

    #[error("No archive entries could be decoded")]
    EmptyArchive,

    #[error("Archive assembly failed: {0}")]
    Archive(String),
}

impl ResponseError for PixelforgeError {
    fn error_response(&self) -> HttpResponse {
        match self {
            PixelforgeError::Validation(_) | PixelforgeError::Decode(_) => {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "Invalid request",
                    "message": self.to_string()
                }))
            }
            PixelforgeError::PollTimeout { .. } | PixelforgeError::UpstreamTimeout(_) => {
                HttpResponse::GatewayTimeout().json(serde_json::json!({
                    "error": "Upstream timeout",
                    "message": self.to_string()
                }))
            }
            _ => HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Generation failed",
                "message": self.to_string()
            })),
        }
    }
}
