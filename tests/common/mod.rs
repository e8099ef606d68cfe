/*!
 * Common test utilities for the vidscribe test suite
 */

use anyhow::Result;
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;
use tempfile::TempDir;

use vidscribe::errors::PipelineError;
use vidscribe::jobs::{ControllerSettings, JobController, JobStatus};
use vidscribe::media::{AudioExtractor, AudioStream, Transcriber};
use vidscribe::providers::mock::MockGenerator;
use vidscribe::segment::RawSegment;
use vidscribe::translation::RetryPolicy;

static INIT_LOGGING: Once = Once::new();

/// Route library logs through env_logger (`RUST_LOG=debug cargo test`)
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a placeholder video file; the stub extractor never decodes it
pub fn create_test_video(dir: &Path, filename: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, b"\x00\x00\x00\x18ftypmp42")?;
    Ok(file_path)
}

/// The two-segment transcript used by the end-to-end scenarios
pub fn sample_transcript() -> Vec<RawSegment> {
    vec![
        RawSegment::new(0.0, 2.5, "Hello world"),
        RawSegment::new(2.5, 5.0, "This is a test"),
    ]
}

/// `count` one-second segments named "Line 0", "Line 1", ...
pub fn numbered_transcript(count: usize) -> Vec<RawSegment> {
    (0..count)
        .map(|i| RawSegment::new(i as f64, i as f64 + 1.0, format!("Line {}", i)))
        .collect()
}

/// Extractor that returns a fixed audio buffer
#[derive(Debug, Default, Clone)]
pub struct StubExtractor {
    failure: Option<String>,
}

impl StubExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl AudioExtractor for StubExtractor {
    async fn extract(&self, _video: &Path) -> Result<AudioStream, PipelineError> {
        match &self.failure {
            Some(message) => Err(PipelineError::ExtractionError(message.clone())),
            None => Ok(AudioStream::wav(vec![0u8; 32])),
        }
    }
}

/// Transcriber that returns a fixed transcript, optionally after a delay
#[derive(Debug, Clone)]
pub struct StubTranscriber {
    segments: Vec<RawSegment>,
    delay: Option<Duration>,
}

impl StubTranscriber {
    pub fn new(segments: Vec<RawSegment>) -> Self {
        Self { segments, delay: None }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Transcriber for StubTranscriber {
    async fn transcribe(&self, _audio: &AudioStream, _source_language: &str) -> Result<Vec<RawSegment>, PipelineError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.segments.clone())
    }
}

/// Retry policy with millisecond backoff
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        base_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        jitter: Duration::ZERO,
        timeout: Duration::from_secs(10),
    }
}

/// Default settings with `max_concurrent_jobs` slots
pub fn settings(max_concurrent_jobs: usize) -> ControllerSettings {
    ControllerSettings {
        max_concurrent_jobs,
        ..ControllerSettings::default()
    }
}

/// Controller over stub media collaborators and a mock generator
pub fn build_controller(
    settings: ControllerSettings,
    extractor: StubExtractor,
    transcriber: StubTranscriber,
    generator: MockGenerator,
) -> JobController {
    init_logging();
    JobController::new(
        settings,
        Arc::new(extractor),
        Arc::new(transcriber),
        Arc::new(generator),
        fast_retry(),
    )
}

/// Wait for a job to end, failing the test after ten seconds
pub async fn wait_terminal(controller: &JobController, job_id: &str) -> JobStatus {
    tokio::time::timeout(
        Duration::from_secs(10),
        controller.wait_for_completion(job_id, Duration::from_millis(5)),
    )
    .await
    .expect("job did not finish in time")
    .expect("job disappeared")
}

/// Poll `condition` every few milliseconds for up to five seconds
pub async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..1000 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
