// src/services/normalizer.rs
//
// The provider's response schema is not contractually fixed; several shapes
// have been observed across revisions. Extraction is an ordered, best-effort
// search where the first match wins, and "nothing found" is a distinct
// outcome from any transport error.
use base64::{Engine as _, engine::general_purpose};
use serde_json::Value;

use crate::models::JobStatus;

#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    InlineBytes(Vec<u8>),
    RemoteArtifact(String),
    NotFound,
}

const LIST_FIELDS: &[&str] = &["data", "results"];
const OBJECT_FIELDS: &[&str] = &["data", "result"];
const B64_FIELDS: &[&str] = &["b64_json", "base64", "image_base64", "image"];
const URL_FIELDS: &[&str] = &["url", "image_url", "image"];
const ID_FIELDS: &[&str] = &["id", "job_id", "task_id"];
const STATUS_FIELDS: &[&str] = &["status", "state"];

pub fn extract_artifact(response: &Value) -> Extracted {
    for field in LIST_FIELDS {
        let first = response
            .get(*field)
            .and_then(|v| v.as_array())
            .and_then(|a| a.first());
        if let Some(entry) = first {
            if let Some(bytes) = inline_bytes(entry) {
                return Extracted::InlineBytes(bytes);
            }
            if let Some(url) = url_field(entry) {
                return Extracted::RemoteArtifact(url);
            }
            if let Some(s) = entry.as_str() {
                if is_url(s) {
                    return Extracted::RemoteArtifact(s.to_string());
                }
            }
        }
    }

    for field in OBJECT_FIELDS {
        if let Some(obj) = response.get(*field).filter(|v| v.is_object()) {
            if let Some(bytes) = inline_bytes(obj) {
                return Extracted::InlineBytes(bytes);
            }
            if let Some(url) = url_field(obj) {
                return Extracted::RemoteArtifact(url);
            }
        }
    }

    if let Some(url) = response.get("url").and_then(|v| v.as_str()) {
        if is_url(url) {
            return Extracted::RemoteArtifact(url.to_string());
        }
    }

    Extracted::NotFound
}

/// Locate the job identifier and initial status in an asynchronous
/// submission or poll response. Missing status with an id present means the
/// job was only just accepted.
pub fn extract_job(response: &Value) -> Option<(String, JobStatus)> {
    let nested = response.get("data").unwrap_or(&Value::Null);
    for scope in [response, nested] {
        if let Some(id) = id_field(scope) {
            let status = extract_status(response).unwrap_or(JobStatus::Pending);
            return Some((id, status));
        }
    }
    None
}

/// Status alone; poll responses do not always repeat the job id.
pub fn extract_status(response: &Value) -> Option<JobStatus> {
    let nested = response.get("data").unwrap_or(&Value::Null);
    for scope in [response, nested] {
        let raw = STATUS_FIELDS
            .iter()
            .find_map(|f| scope.get(*f).and_then(|v| v.as_str()));
        if let Some(raw) = raw {
            return Some(JobStatus::parse(raw));
        }
    }
    None
}

/// Provider-supplied failure text, wherever it was put.
pub fn extract_error(response: &Value) -> Option<String> {
    for field in ["error", "message", "detail"] {
        match response.get(field) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Object(obj)) => {
                if let Some(Value::String(s)) = obj.get("message") {
                    return Some(s.clone());
                }
            }
            _ => {}
        }
    }
    None
}

fn inline_bytes(entry: &Value) -> Option<Vec<u8>> {
    for field in B64_FIELDS {
        if let Some(raw) = entry.get(*field).and_then(|v| v.as_str()) {
            if is_url(raw) {
                continue;
            }
            // A malformed payload means the slot held no artifact after all.
            if let Ok(bytes) = general_purpose::STANDARD.decode(strip_data_uri(raw)) {
                return Some(bytes);
            }
        }
    }
    None
}

fn url_field(entry: &Value) -> Option<String> {
    URL_FIELDS
        .iter()
        .find_map(|f| entry.get(*f).and_then(|v| v.as_str()))
        .filter(|s| is_url(s))
        .map(|s| s.to_string())
}

fn id_field(scope: &Value) -> Option<String> {
    ID_FIELDS.iter().find_map(|f| match scope.get(*f) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

fn strip_data_uri(s: &str) -> &str {
    if s.starts_with("data:") {
        s.split_once(',').map(|(_, rest)| rest).unwrap_or(s)
    } else {
        s
    }
}
