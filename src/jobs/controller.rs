/*!
 * Job controller.
 *
 * Owns every job from submission to removal. Each job runs in its own task
 * and needs one permit of a fair semaphore before it leaves `Created`, so at
 * most `max_concurrent_jobs` pipelines run at once and the rest are admitted
 * in FIFO order. The registry mutex is only ever held for short synchronous
 * sections, never across an `.await`.
 */

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::app_config::Config;
use crate::database::{DatabaseConnection, JobRecord, Repository};
use crate::errors::{JobError, PipelineError};
use crate::language_utils;
use crate::media::{AudioExtractor, FfmpegExtractor, Transcriber, WhisperTranscriber};
use crate::providers::{self, TextGenerator};
use crate::segment::{self, RawSegment, Segment};
use crate::subtitle_processor;
use crate::translation::{ContextBuilder, RetryPolicy, TranslationControl, TranslationCoordinator};

use super::cancel::CancelToken;
use super::models::{short_id, Job, JobState, JobStatus};

/// Smallest transcript sample the context call is given
pub const MIN_CONTEXT_TOKENS: usize = 64;

/// Tunables of the controller
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    /// Jobs running at once
    pub max_concurrent_jobs: usize,
    /// In-flight translation calls per job
    pub concurrency_limit: usize,
    /// Segments per translation call
    pub batch_size: usize,
    /// Token budget of the context sample
    pub context_max_tokens: usize,
    /// Longest wait in the admission queue
    pub admission_timeout: Option<Duration>,
    /// How long terminal jobs stay queryable
    pub retention: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ControllerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrent_jobs: config.jobs.max_concurrent_jobs.max(1),
            concurrency_limit: config.translation.concurrent_requests.max(1),
            batch_size: config.translation.batch_size.max(1),
            context_max_tokens: config.translation.context_max_tokens.max(MIN_CONTEXT_TOKENS),
            admission_timeout: config.jobs.admission_timeout_secs.map(Duration::from_secs),
            retention: Duration::from_secs(config.jobs.retention_secs),
        }
    }
}

struct JobEntry {
    job: Job,
    cancel: CancelToken,
}

enum Admission {
    Granted(OwnedSemaphorePermit),
    Cancelled,
    TimedOut(Duration),
}

/// Stateless collaborators shared by every job
struct Pipeline {
    extractor: Arc<dyn AudioExtractor>,
    transcriber: Arc<dyn Transcriber>,
    context_builder: ContextBuilder,
    coordinator: TranslationCoordinator,
}

/// Runs and tracks transcription/translation jobs
#[derive(Clone)]
pub struct JobController {
    registry: Arc<Mutex<HashMap<String, JobEntry>>>,
    admission: Arc<Semaphore>,
    pipeline: Arc<Pipeline>,
    repository: Option<Repository>,
    settings: ControllerSettings,
}

impl JobController {
    pub fn new(
        settings: ControllerSettings,
        extractor: Arc<dyn AudioExtractor>,
        transcriber: Arc<dyn Transcriber>,
        generator: Arc<dyn TextGenerator>,
        retry: RetryPolicy,
    ) -> Self {
        let pipeline = Pipeline {
            extractor,
            transcriber,
            context_builder: ContextBuilder::new(generator.clone(), retry.clone()),
            coordinator: TranslationCoordinator::new(generator, retry).with_batch_size(settings.batch_size),
        };

        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            admission: Arc::new(Semaphore::new(settings.max_concurrent_jobs.max(1))),
            pipeline: Arc::new(pipeline),
            repository: None,
            settings,
        }
    }

    /// Controller wired to ffmpeg, the configured transcriber and text generator,
    /// and the job database when one is configured
    pub fn from_config(config: &Config) -> Result<Self> {
        let controller = Self::new(
            ControllerSettings::from_config(config),
            Arc::new(FfmpegExtractor::new(config.media.clone())),
            Arc::new(WhisperTranscriber::new(&config.transcription)),
            providers::build_generator(&config.translation),
            RetryPolicy::for_translation(&config.translation),
        );

        match &config.jobs.database_path {
            Some(path) => {
                let db = DatabaseConnection::new(path)
                    .with_context(|| format!("Failed to open job database {:?}", path))?;
                Ok(controller.with_repository(Repository::new(db)))
            }
            None => Ok(controller),
        }
    }

    /// Persist job records through `repository`
    pub fn with_repository(mut self, repository: Repository) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Accept a job and start it in the background.
    ///
    /// Acceptance is immediate; admission control only delays execution.
    /// Must be called within a tokio runtime.
    pub fn submit_job(
        &self,
        video_ref: impl AsRef<Path>,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, JobError> {
        self.accept(video_ref.as_ref(), source_language, target_language, None)
    }

    /// Accept a job whose transcript is already known, such as one loaded
    /// from a transcript CSV. Extraction and transcription pass without work.
    pub fn submit_transcript(
        &self,
        source_ref: impl AsRef<Path>,
        transcript: Vec<RawSegment>,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, JobError> {
        if transcript.is_empty() {
            return Err(JobError::InvalidSubmission("transcript has no segments".to_string()));
        }
        self.accept(source_ref.as_ref(), source_language, target_language, Some(transcript))
    }

    fn accept(
        &self,
        video_ref: &Path,
        source_language: &str,
        target_language: &str,
        transcript: Option<Vec<RawSegment>>,
    ) -> Result<String, JobError> {
        let video_ref = video_ref.to_string_lossy().to_string();
        if video_ref.trim().is_empty() {
            return Err(JobError::InvalidSubmission("empty video reference".to_string()));
        }
        for code in [source_language, target_language] {
            language_utils::validate_language_code(code)
                .map_err(|e| JobError::InvalidSubmission(e.to_string()))?;
            if !language_utils::is_supported_language(code) {
                return Err(JobError::InvalidSubmission(format!("unsupported language: {}", code)));
            }
        }
        if language_utils::language_codes_match(source_language, target_language) {
            return Err(JobError::InvalidSubmission(format!(
                "source and target language are both {}",
                source_language
            )));
        }

        let id = Uuid::new_v4().to_string();
        let job = Job::new(id.clone(), video_ref.clone(), source_language, target_language, Utc::now());
        let cancel = CancelToken::new();
        self.registry.lock().insert(
            id.clone(),
            JobEntry {
                job,
                cancel: cancel.clone(),
            },
        );

        info!(
            "Job {} accepted: {} ({} -> {})",
            short_id(&id),
            video_ref,
            source_language,
            target_language
        );
        tokio::spawn(self.clone().run_job(id.clone(), cancel, transcript));
        Ok(id)
    }

    pub fn get_status(&self, job_id: &str) -> Result<JobStatus, JobError> {
        self.registry
            .lock()
            .get(job_id)
            .map(|entry| entry.job.status())
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    /// Subtitle bytes of a completed job; never partial output
    pub fn get_result(&self, job_id: &str) -> Result<Vec<u8>, JobError> {
        let registry = self.registry.lock();
        let job = &registry
            .get(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?
            .job;

        match job.state {
            JobState::Completed => job.result.clone().ok_or_else(|| JobError::NotReady(job_id.to_string())),
            JobState::Failed => {
                let error = job.error.clone();
                Err(JobError::JobFailed {
                    stage: error.as_ref().map_or(job.stage, |e| e.stage).to_string(),
                    kind: error.as_ref().map(|e| e.kind.clone()).unwrap_or_default(),
                    message: error.map(|e| e.message).unwrap_or_default(),
                })
            }
            JobState::Cancelled => Err(JobError::JobCancelled(job_id.to_string())),
            _ => Err(JobError::NotReady(job_id.to_string())),
        }
    }

    /// Segments of a completed job with their translation state.
    ///
    /// Jobs restored from storage carry no segments.
    pub fn get_segments(&self, job_id: &str) -> Result<Vec<Segment>, JobError> {
        let registry = self.registry.lock();
        let job = &registry
            .get(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?
            .job;
        match job.state {
            JobState::Completed => Ok(job.segments.clone()),
            _ => Err(JobError::NotReady(job_id.to_string())),
        }
    }

    /// Request cancellation; acknowledged even when the job already ended
    pub fn cancel(&self, job_id: &str) -> Result<(), JobError> {
        let registry = self.registry.lock();
        let entry = registry
            .get(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        if !entry.job.state.is_terminal() {
            info!("Job {} cancellation requested in {}", short_id(job_id), entry.job.state);
            entry.cancel.cancel();
        }
        Ok(())
    }

    /// Every known job, oldest first
    pub fn list_jobs(&self) -> Vec<JobStatus> {
        let mut statuses: Vec<JobStatus> = self.registry.lock().values().map(|e| e.job.status()).collect();
        statuses.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        statuses
    }

    /// Poll until the job reaches a terminal state
    pub async fn wait_for_completion(&self, job_id: &str, poll_interval: Duration) -> Result<JobStatus, JobError> {
        loop {
            let status = self.get_status(job_id)?;
            if status.state.is_terminal() {
                return Ok(status);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Remove a finished job from memory and storage
    pub async fn release(&self, job_id: &str) -> Result<(), JobError> {
        {
            let mut registry = self.registry.lock();
            let entry = registry
                .get(job_id)
                .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
            if !entry.job.state.is_terminal() {
                return Err(JobError::NotReady(job_id.to_string()));
            }
            registry.remove(job_id);
        }

        self.forget(job_id).await;
        debug!("Job {} released", short_id(job_id));
        Ok(())
    }

    /// Drop terminal jobs whose last update is older than the retention period.
    ///
    /// Returns the removed ids.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<String> {
        let retention = chrono::Duration::from_std(self.settings.retention)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        let expired: Vec<String> = {
            let mut registry = self.registry.lock();
            let ids: Vec<String> = registry
                .values()
                .filter(|e| e.job.state.is_terminal() && now.signed_duration_since(e.job.updated_at) >= retention)
                .map(|e| e.job.id.clone())
                .collect();
            for id in &ids {
                registry.remove(id);
            }
            ids
        };

        for id in &expired {
            self.forget(id).await;
        }
        if !expired.is_empty() {
            info!("Swept {} expired jobs", expired.len());
        }
        expired
    }

    /// Run `sweep_expired` every `interval` until the handle is aborted
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                controller.sweep_expired(Utc::now()).await;
            }
        })
    }

    /// Load stored jobs into the registry.
    ///
    /// Jobs that were still running when the process stopped are marked
    /// failed with kind `interrupted`. Returns the number of loaded jobs.
    pub async fn restore(&self) -> Result<usize> {
        let Some(repository) = &self.repository else {
            return Ok(0);
        };

        let now = Utc::now();
        let mut loaded = 0;
        for record in repository.list_jobs().await? {
            let id = record.id.clone();
            let mut job = match record.into_job() {
                Ok(job) => job,
                Err(e) => {
                    warn!("Skipping unreadable job record {}: {}", short_id(&id), e);
                    continue;
                }
            };

            if !job.state.is_terminal() {
                job.fail(&PipelineError::Interrupted, now)?;
                repository.save_job(&JobRecord::from_job(&job)).await?;
                warn!("Job {} was interrupted during {}", short_id(&id), job.stage);
            }

            let mut registry = self.registry.lock();
            if !registry.contains_key(&id) {
                registry.insert(
                    id,
                    JobEntry {
                        job,
                        cancel: CancelToken::new(),
                    },
                );
                loaded += 1;
            }
        }

        info!("Restored {} jobs from storage", loaded);
        Ok(loaded)
    }

    async fn run_job(self, id: String, cancel: CancelToken, transcript: Option<Vec<RawSegment>>) {
        self.persist(&id).await;

        let outcome = match self.admit(&cancel).await {
            Admission::Granted(permit) => {
                debug!("Job {} admitted", short_id(&id));
                let outcome = self.run_pipeline(&id, &cancel, transcript).await;
                drop(permit);
                outcome
            }
            Admission::Cancelled => Err(PipelineError::Cancelled),
            Admission::TimedOut(waited) => Err(PipelineError::AdmissionTimeout(waited.as_secs())),
        };

        self.finish(&id, outcome, &cancel).await;
    }

    async fn admit(&self, cancel: &CancelToken) -> Admission {
        let deadline = self.settings.admission_timeout;
        let expiry = async {
            match deadline {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Admission::Cancelled,
            permit = self.admission.clone().acquire_owned() => match permit {
                Ok(permit) => Admission::Granted(permit),
                Err(_) => Admission::Cancelled,
            },
            _ = expiry => Admission::TimedOut(deadline.unwrap_or_default()),
        }
    }

    async fn run_pipeline(
        &self,
        id: &str,
        cancel: &CancelToken,
        transcript: Option<Vec<RawSegment>>,
    ) -> Result<Vec<u8>, PipelineError> {
        let (video_ref, source_language, target_language) = self.with_job(id, |job| {
            (job.video_ref.clone(), job.source_language.clone(), job.target_language.clone())
        })?;

        self.enter(id, JobState::Extracting, cancel).await?;
        let raw = match transcript {
            Some(raw) => {
                debug!("Job {} uses a supplied transcript", short_id(id));
                self.enter(id, JobState::Transcribing, cancel).await?;
                raw
            }
            None => {
                let audio = self.pipeline.extractor.extract(Path::new(&video_ref)).await?;
                if let Some(secs) = audio.duration_secs {
                    info!("Job {} extracted {:.1}s of audio", short_id(id), secs);
                }
                self.enter(id, JobState::Transcribing, cancel).await?;
                self.pipeline.transcriber.transcribe(&audio, &source_language).await?
            }
        };
        if raw.is_empty() {
            return Err(PipelineError::TranscriptionError("no speech segments recognized".to_string()));
        }
        let segments = Segment::from_raw(raw);
        segment::validate(&segments)?;
        info!("Job {} transcribed {} segments", short_id(id), segments.len());
        self.with_job(id, |job| job.segments = segments.clone())?;

        self.enter(id, JobState::BuildingContext, cancel).await?;
        let context = self
            .pipeline
            .context_builder
            .build(&segments, &source_language, &target_language, self.settings.context_max_tokens)
            .await?;
        self.with_job(id, |job| job.context = Some(context.clone()))?;

        self.enter(id, JobState::Translating, cancel).await?;
        let control = TranslationControl {
            cancel: Some(cancel.clone()),
            progress: Some(self.progress_reporter(id)),
        };
        let translated = self
            .pipeline
            .coordinator
            .translate_all_with(segments, &context, self.settings.concurrency_limit, &control)
            .await?;

        let total = translated.len();
        let done: Vec<Segment> = translated.iter().filter(|s| s.is_translated()).cloned().collect();
        if done.is_empty() {
            return Err(PipelineError::NoSegmentsTranslated(total));
        }
        if done.len() < total {
            warn!(
                "Job {}: {} of {} segments failed and are left out",
                short_id(id),
                total - done.len(),
                total
            );
        }
        self.with_job(id, |job| job.segments = translated)?;

        self.enter(id, JobState::Encoding, cancel).await?;
        subtitle_processor::encode(&done)
    }

    /// Check cancellation, then advance to `stage` and persist
    async fn enter(&self, id: &str, stage: JobState, cancel: &CancelToken) -> Result<(), PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        self.with_job(id, |job| job.advance(stage, Utc::now()))??;
        debug!("Job {} entered {}", short_id(id), stage);
        self.persist(id).await;
        Ok(())
    }

    /// Move the job to its terminal state. The terminal record is stored
    /// before it becomes visible, so nothing writes to storage afterwards.
    async fn finish(&self, id: &str, outcome: Result<Vec<u8>, PipelineError>, cancel: &CancelToken) {
        let now = Utc::now();
        let finished = self.with_job(id, |job| {
            let mut job = job.clone();
            let result = match outcome {
                Ok(bytes) => job.complete(bytes, now),
                Err(_) if cancel.is_cancelled() => job.cancel(now),
                Err(error) => job.fail(&error, now),
            };
            result.map(|()| job)
        });

        let job = match finished {
            Ok(Ok(job)) => job,
            Ok(Err(e)) => {
                error!("Job {} could not be finalized: {}", short_id(id), e);
                return;
            }
            Err(_) => {
                debug!("Job {} was released before it finished", short_id(id));
                return;
            }
        };

        match &job.error {
            Some(error) => error!("Job {} failed: {}", short_id(id), error),
            None => info!("Job {} {}", short_id(id), job.state),
        }

        if let Some(repository) = &self.repository {
            if let Err(e) = repository.save_job(&JobRecord::from_job(&job)).await {
                warn!("Failed to persist job {}: {}", short_id(id), e);
            }
        }
        let _ = self.with_job(id, |entry| *entry = job);
    }

    fn progress_reporter(&self, id: &str) -> Arc<dyn Fn(usize, usize) + Send + Sync> {
        let registry = self.registry.clone();
        let id = id.to_string();
        Arc::new(move |done, total| {
            if let Some(entry) = registry.lock().get_mut(&id) {
                entry.job.set_progress(Job::translating_progress(done, total), Utc::now());
            }
        })
    }

    /// Run `f` on the job under the registry lock
    fn with_job<T>(&self, id: &str, f: impl FnOnce(&mut Job) -> T) -> Result<T, PipelineError> {
        let mut registry = self.registry.lock();
        let entry = registry.get_mut(id).ok_or(PipelineError::Cancelled)?;
        Ok(f(&mut entry.job))
    }

    async fn persist(&self, id: &str) {
        let Some(repository) = &self.repository else {
            return;
        };
        let record = match self.with_job(id, |job| JobRecord::from_job(job)) {
            Ok(record) => record,
            Err(_) => return,
        };
        if let Err(e) = repository.save_job(&record).await {
            warn!("Failed to persist job {}: {}", short_id(id), e);
        }
    }

    async fn forget(&self, id: &str) {
        if let Some(repository) = &self.repository {
            if let Err(e) = repository.delete_job(id).await {
                warn!("Failed to delete job {} from storage: {}", short_id(id), e);
            }
        }
    }
}
