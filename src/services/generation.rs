// src/services/generation.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info};
use rand::Rng;
use serde_json::{Value, json};

use crate::errors::PixelforgeError;
use crate::models::{Artifact, GenerateRequest, JobStatus, ProviderJob};
use crate::services::normalizer::{self, Extracted};
use crate::services::provider::ImageProvider;

/// Upper bound of the randomly drawn seed range.
pub const SEED_MAX: i64 = i32::MAX as i64;

#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay before each of the early status queries.
    pub initial_delay: Duration,
    /// Number of attempts polled at the initial delay before ramping.
    pub ramp_after: u32,
    /// Factor by which the delay grows per attempt once ramping.
    pub multiplier: f64,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Hard ceiling on status queries before giving up.
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(750),
            ramp_after: 10,
            multiplier: 1.15,
            max_delay: Duration::from_millis(2500),
            max_attempts: 90,
        }
    }
}

/// Calculate the wait before the attempt after `attempt`. Flat for the
/// first `ramp_after` attempts, then multiplicative up to `max_delay`.
pub fn next_delay(current: Duration, attempt: u32, config: &PollConfig) -> Duration {
    if attempt < config.ramp_after {
        return current;
    }
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

pub fn resolve_seed(seed: i64) -> i64 {
    if seed < 0 {
        rand::rng().random_range(0..=SEED_MAX)
    } else {
        seed
    }
}

pub struct GenerationService {
    provider: Arc<dyn ImageProvider>,
    model: String,
    poll: PollConfig,
}

impl GenerationService {
    pub fn new(provider: Arc<dyn ImageProvider>, model: String, poll: PollConfig) -> Self {
        Self {
            provider,
            model,
            poll,
        }
    }

    pub async fn generate(&self, request: &GenerateRequest) -> Result<Artifact, PixelforgeError> {
        let seed = resolve_seed(request.seed);
        let (width, height) = request.dimensions();

        let mut body = json!({
            "model": self.model,
            "prompt": request.prompt,
            "width": width,
            "height": height,
            "seed": seed,
            "n": 1,
        });
        if let Some(negative) = &request.negative_prompt {
            body["negative_prompt"] = json!(negative);
        }

        let response = self.provider.submit(&body).await?;

        // Some provider revisions answer with the artifact right away.
        match normalizer::extract_artifact(&response) {
            Extracted::InlineBytes(bytes) => {
                info!("Generation completed synchronously ({} bytes)", bytes.len());
                return Ok(Artifact {
                    data: bytes.into(),
                    seed,
                });
            }
            Extracted::RemoteArtifact(url) => {
                info!("Generation completed synchronously (remote artifact)");
                return self.fetch_artifact(&url, seed).await;
            }
            Extracted::NotFound => {}
        }

        let Some((job_id, status)) = normalizer::extract_job(&response) else {
            return Err(PixelforgeError::UnrecognizedResponse);
        };

        let mut job = ProviderJob::new(job_id, status);
        job.error = normalizer::extract_error(&response);
        info!("Job {} accepted with status {:?}", job.id, job.status);

        // The submission itself may already report a terminal state; a
        // terminal job is never queried again.
        match job.status {
            JobStatus::Failed | JobStatus::Canceled => {
                return Err(PixelforgeError::ProviderJobFailed(job_error_text(&job)));
            }
            JobStatus::Succeeded => {
                // Claimed success, but artifact extraction above found nothing.
                return Err(PixelforgeError::ArtifactMissing);
            }
            JobStatus::Pending | JobStatus::Running => {}
        }

        let final_response = self.poll_job(&mut job).await?;

        match normalizer::extract_artifact(&final_response) {
            Extracted::InlineBytes(bytes) => Ok(Artifact {
                data: bytes.into(),
                seed,
            }),
            Extracted::RemoteArtifact(url) => self.fetch_artifact(&url, seed).await,
            Extracted::NotFound => Err(PixelforgeError::ArtifactMissing),
        }
    }

    /// Drive the job to a terminal state, returning the poll response that
    /// reported success.
    async fn poll_job(&self, job: &mut ProviderJob) -> Result<Value, PixelforgeError> {
        let mut delay = self.poll.initial_delay;

        for attempt in 1..=self.poll.max_attempts {
            tokio::time::sleep(delay).await;
            delay = next_delay(delay, attempt, &self.poll);

            let Some(response) = self.provider.poll(&job.id).await? else {
                debug!("Job {}: poll attempt {} skipped", job.id, attempt);
                continue;
            };

            let status = normalizer::extract_status(&response);
            job.update(
                status.unwrap_or(job.status),
                normalizer::extract_error(&response),
            );
            debug!(
                "Job {}: attempt {} status {:?}",
                job.id, attempt, job.status
            );

            match status {
                Some(JobStatus::Succeeded) => {
                    let elapsed = Utc::now().signed_duration_since(job.submitted_at);
                    info!(
                        "Job {} succeeded after {} polls ({}ms)",
                        job.id,
                        attempt,
                        elapsed.num_milliseconds()
                    );
                    return Ok(response);
                }
                Some(JobStatus::Failed) | Some(JobStatus::Canceled) => {
                    return Err(PixelforgeError::ProviderJobFailed(job_error_text(job)));
                }
                Some(JobStatus::Pending) | Some(JobStatus::Running) => {}
                // No status at all: a few revisions answer the status
                // endpoint with the finished result object directly.
                None => {
                    if normalizer::extract_artifact(&response) != Extracted::NotFound {
                        job.update(JobStatus::Succeeded, None);
                        return Ok(response);
                    }
                }
            }
        }

        Err(PixelforgeError::PollTimeout {
            attempts: self.poll.max_attempts,
        })
    }

    async fn fetch_artifact(&self, url: &str, seed: i64) -> Result<Artifact, PixelforgeError> {
        let data = self.provider.fetch(url).await?;
        Ok(Artifact { data, seed })
    }
}

fn job_error_text(job: &ProviderJob) -> String {
    job.error
        .clone()
        .unwrap_or_else(|| "no detail supplied".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SEED_RANDOM;
    use async_trait::async_trait;
    use base64::{Engine as _, engine::general_purpose};
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    const IMAGE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    fn image_b64() -> String {
        general_purpose::STANDARD.encode(IMAGE)
    }

    struct MockProvider {
        submit_response: Value,
        submitted: Mutex<Option<Value>>,
        polls: Mutex<VecDeque<Option<Value>>>,
        poll_count: AtomicU32,
        fetch_data: Option<Vec<u8>>,
        fetch_count: AtomicU32,
    }

    impl MockProvider {
        fn new(submit_response: Value) -> Self {
            Self {
                submit_response,
                submitted: Mutex::new(None),
                polls: Mutex::new(VecDeque::new()),
                poll_count: AtomicU32::new(0),
                fetch_data: None,
                fetch_count: AtomicU32::new(0),
            }
        }

        /// Script the poll responses; `None` entries simulate transient
        /// per-query failures. Once exhausted the job stays pending.
        fn with_polls(mut self, polls: Vec<Option<Value>>) -> Self {
            self.polls = Mutex::new(polls.into_iter().collect());
            self
        }

        fn with_fetch(mut self, data: &[u8]) -> Self {
            self.fetch_data = Some(data.to_vec());
            self
        }

        fn polls_issued(&self) -> u32 {
            self.poll_count.load(Ordering::SeqCst)
        }

        fn fetches_issued(&self) -> u32 {
            self.fetch_count.load(Ordering::SeqCst)
        }

        fn submitted_body(&self) -> Value {
            self.submitted.lock().unwrap().clone().unwrap()
        }
    }

    #[async_trait]
    impl ImageProvider for MockProvider {
        async fn submit(&self, body: &Value) -> Result<Value, PixelforgeError> {
            *self.submitted.lock().unwrap() = Some(body.clone());
            Ok(self.submit_response.clone())
        }

        async fn poll(&self, _job_id: &str) -> Result<Option<Value>, PixelforgeError> {
            self.poll_count.fetch_add(1, Ordering::SeqCst);
            let next = self.polls.lock().unwrap().pop_front();
            match next {
                Some(entry) => Ok(entry),
                None => Ok(Some(json!({ "status": "pending" }))),
            }
        }

        async fn fetch(&self, _url: &str) -> Result<Bytes, PixelforgeError> {
            self.fetch_count.fetch_add(1, Ordering::SeqCst);
            match &self.fetch_data {
                Some(data) => Ok(Bytes::from(data.clone())),
                None => Err(PixelforgeError::ArtifactFetch { status: 404 }),
            }
        }
    }

    fn test_poll_config() -> PollConfig {
        PollConfig {
            initial_delay: Duration::from_millis(1),
            ramp_after: 2,
            multiplier: 2.0,
            max_delay: Duration::from_millis(4),
            max_attempts: 5,
        }
    }

    fn service(mock: Arc<MockProvider>) -> GenerationService {
        GenerationService::new(mock, "test-model".to_string(), test_poll_config())
    }

    fn request(seed: i64) -> GenerateRequest {
        GenerateRequest {
            prompt: "a lighthouse in a storm".to_string(),
            negative_prompt: None,
            style: "none".to_string(),
            seed,
            ratio: "1:1".to_string(),
            enhance: false,
        }
    }

    #[tokio::test]
    async fn synchronous_inline_artifact_skips_polling() {
        let mock = Arc::new(MockProvider::new(
            json!({ "data": [{ "b64_json": image_b64() }] }),
        ));
        let artifact = service(mock.clone()).generate(&request(7)).await.unwrap();

        assert_eq!(artifact.data.as_ref(), IMAGE);
        assert_eq!(artifact.seed, 7);
        assert_eq!(mock.polls_issued(), 0);
    }

    #[tokio::test]
    async fn synchronous_remote_artifact_is_fetched() {
        let mock = Arc::new(
            MockProvider::new(json!({ "data": [{ "url": "https://cdn.example/img.png" }] }))
                .with_fetch(IMAGE),
        );
        let artifact = service(mock.clone()).generate(&request(7)).await.unwrap();

        assert_eq!(artifact.data.as_ref(), IMAGE);
        assert_eq!(mock.fetches_issued(), 1);
        assert_eq!(mock.polls_issued(), 0);
    }

    #[tokio::test]
    async fn polls_until_succeeded() {
        let mock = Arc::new(
            MockProvider::new(json!({ "id": "job-1", "status": "pending" })).with_polls(vec![
                Some(json!({ "status": "pending" })),
                Some(json!({ "status": "running" })),
                Some(json!({ "status": "succeeded", "data": [{ "b64_json": image_b64() }] })),
            ]),
        );
        let artifact = service(mock.clone()).generate(&request(3)).await.unwrap();

        assert_eq!(artifact.data.as_ref(), IMAGE);
        assert_eq!(mock.polls_issued(), 3);
    }

    #[tokio::test]
    async fn poll_ceiling_yields_timeout() {
        let mock = Arc::new(MockProvider::new(json!({ "id": "job-1", "status": "pending" })));
        let err = service(mock.clone()).generate(&request(3)).await.err().unwrap();

        assert!(matches!(err, PixelforgeError::PollTimeout { attempts: 5 }));
        assert_eq!(mock.polls_issued(), 5);
    }

    #[tokio::test]
    async fn provider_failure_carries_error_text() {
        let mock = Arc::new(
            MockProvider::new(json!({ "id": "job-1", "status": "pending" })).with_polls(vec![
                Some(json!({ "status": "failed", "error": "content policy" })),
            ]),
        );
        let err = service(mock.clone()).generate(&request(3)).await.err().unwrap();

        match err {
            PixelforgeError::ProviderJobFailed(msg) => assert_eq!(msg, "content policy"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(mock.polls_issued(), 1);
    }

    #[tokio::test]
    async fn transient_poll_failures_are_skipped() {
        let mock = Arc::new(
            MockProvider::new(json!({ "id": "job-1", "status": "pending" })).with_polls(vec![
                None,
                Some(json!({ "status": "completed", "data": [{ "b64_json": image_b64() }] })),
            ]),
        );
        let artifact = service(mock.clone()).generate(&request(3)).await.unwrap();

        assert_eq!(artifact.data.as_ref(), IMAGE);
        assert_eq!(mock.polls_issued(), 2);
    }

    #[tokio::test]
    async fn success_without_artifact_is_missing() {
        let mock = Arc::new(
            MockProvider::new(json!({ "id": "job-1", "status": "pending" }))
                .with_polls(vec![Some(json!({ "status": "succeeded" }))]),
        );
        let err = service(mock).generate(&request(3)).await.err().unwrap();

        assert!(matches!(err, PixelforgeError::ArtifactMissing));
    }

    #[tokio::test]
    async fn unrecognized_submission_shape() {
        let mock = Arc::new(MockProvider::new(json!({ "ok": true })));
        let err = service(mock).generate(&request(3)).await.err().unwrap();

        assert!(matches!(err, PixelforgeError::UnrecognizedResponse));
    }

    #[tokio::test]
    async fn terminal_submission_is_never_polled() {
        let mock = Arc::new(MockProvider::new(
            json!({ "id": "job-1", "status": "failed", "error": "moderation" }),
        ));
        let err = service(mock.clone()).generate(&request(3)).await.err().unwrap();

        match err {
            PixelforgeError::ProviderJobFailed(msg) => assert_eq!(msg, "moderation"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(mock.polls_issued(), 0);
    }

    #[tokio::test]
    async fn statusless_poll_response_with_artifact_completes() {
        let mock = Arc::new(
            MockProvider::new(json!({ "id": "job-1", "status": "pending" }))
                .with_polls(vec![Some(json!({ "data": [{ "b64_json": image_b64() }] }))]),
        );
        let artifact = service(mock).generate(&request(3)).await.unwrap();

        assert_eq!(artifact.data.as_ref(), IMAGE);
    }

    #[tokio::test]
    async fn explicit_seed_passes_through_to_submission_and_result() {
        let mock = Arc::new(MockProvider::new(
            json!({ "data": [{ "b64_json": image_b64() }] }),
        ));
        let artifact = service(mock.clone()).generate(&request(1234)).await.unwrap();

        assert_eq!(artifact.seed, 1234);
        assert_eq!(mock.submitted_body()["seed"], json!(1234));
        assert_eq!(mock.submitted_body()["model"], json!("test-model"));
        assert_eq!(mock.submitted_body()["width"], json!(1024));
    }

    #[tokio::test]
    async fn sentinel_seed_is_resolved_before_submission() {
        let mock = Arc::new(MockProvider::new(
            json!({ "data": [{ "b64_json": image_b64() }] }),
        ));
        let artifact = service(mock.clone())
            .generate(&request(SEED_RANDOM))
            .await
            .unwrap();

        assert!((0..=SEED_MAX).contains(&artifact.seed));
        assert_eq!(mock.submitted_body()["seed"], json!(artifact.seed));
    }

    #[test]
    fn resolved_seed_stays_in_range() {
        for _ in 0..100 {
            let seed = resolve_seed(SEED_RANDOM);
            assert!((0..=SEED_MAX).contains(&seed));
        }
        assert_eq!(resolve_seed(42), 42);
        assert_eq!(resolve_seed(0), 0);
    }

    #[test]
    fn delay_is_flat_before_ramp() {
        let config = PollConfig::default();
        let d = next_delay(Duration::from_millis(750), 5, &config);
        assert_eq!(d, Duration::from_millis(750));
    }

    #[test]
    fn delay_ramps_after_threshold() {
        let config = PollConfig::default();
        let d = next_delay(Duration::from_millis(750), 10, &config);
        assert_eq!(d, Duration::from_millis(862));
    }

    #[test]
    fn delay_clamps_at_max() {
        let config = PollConfig::default();
        let d = next_delay(Duration::from_millis(2400), 50, &config);
        assert_eq!(d, Duration::from_millis(2500));
        let d = next_delay(Duration::from_millis(2500), 51, &config);
        assert_eq!(d, Duration::from_millis(2500));
    }
}
