/*!
 * Job entity and its state machine.
 *
 * A job walks `Created → Extracting → Transcribing → BuildingContext →
 * Translating → Encoding → Completed` without skipping a stage. `Failed`
 * and `Cancelled` are reachable from any non-terminal state. Progress and
 * `updated_at` never move backwards.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::PipelineError;
use crate::segment::Segment;
use crate::translation::context::JobContext;

/// State of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted, waiting for an execution slot
    Created,
    Extracting,
    Transcribing,
    BuildingContext,
    Translating,
    Encoding,
    /// Subtitle bytes are available
    Completed,
    /// Ended on a job-fatal error
    Failed,
    /// Ended on request
    Cancelled,
}

impl JobState {
    /// Completed, Failed or Cancelled
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }

    /// Stage following this one on the success path
    pub fn next_stage(&self) -> Option<JobState> {
        match self {
            JobState::Created => Some(JobState::Extracting),
            JobState::Extracting => Some(JobState::Transcribing),
            JobState::Transcribing => Some(JobState::BuildingContext),
            JobState::BuildingContext => Some(JobState::Translating),
            JobState::Translating => Some(JobState::Encoding),
            JobState::Encoding => Some(JobState::Completed),
            JobState::Completed | JobState::Failed | JobState::Cancelled => None,
        }
    }

    /// Percentage band `(low, high)` covered by this stage
    pub fn progress_band(&self) -> (u8, u8) {
        match self {
            JobState::Created => (0, 0),
            JobState::Extracting => (0, 10),
            JobState::Transcribing => (10, 40),
            JobState::BuildingContext => (40, 45),
            JobState::Translating => (45, 90),
            JobState::Encoding => (90, 100),
            JobState::Completed => (100, 100),
            JobState::Failed | JobState::Cancelled => (0, 100),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Extracting => "extracting",
            JobState::Transcribing => "transcribing",
            JobState::BuildingContext => "building_context",
            JobState::Translating => "translating",
            JobState::Encoding => "encoding",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" => Ok(JobState::Created),
            "extracting" => Ok(JobState::Extracting),
            "transcribing" => Ok(JobState::Transcribing),
            "building_context" => Ok(JobState::BuildingContext),
            "translating" => Ok(JobState::Translating),
            "encoding" => Ok(JobState::Encoding),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            "cancelled" => Ok(JobState::Cancelled),
            _ => Err(anyhow::anyhow!("Invalid job state: {}", s)),
        }
    }
}

/// Structured error of a failed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobErrorInfo {
    /// Stage the job was in when it failed
    pub stage: JobState,
    /// Stable error kind, see `PipelineError::kind`
    pub kind: String,
    pub message: String,
}

impl JobErrorInfo {
    pub fn new(stage: JobState, error: &PipelineError) -> Self {
        Self {
            stage,
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for JobErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} during {}: {}", self.kind, self.stage, self.message)
    }
}

/// Snapshot returned by `get_status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: String,
    pub state: JobState,
    pub progress: u8,
    /// Last pipeline stage the job entered
    pub current_stage: JobState,
    pub error: Option<JobErrorInfo>,
    pub video_ref: String,
    pub source_language: String,
    pub target_language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One end-to-end processing request
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub video_ref: String,
    pub source_language: String,
    pub target_language: String,
    pub state: JobState,
    /// Last pipeline stage entered; stays put when the job fails or is cancelled
    pub stage: JobState,
    pub progress: u8,
    pub segments: Vec<Segment>,
    pub context: Option<JobContext>,
    pub error: Option<JobErrorInfo>,
    /// Encoded subtitles, only once Completed
    pub result: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        video_ref: impl Into<String>,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            video_ref: video_ref.into(),
            source_language: source_language.into(),
            target_language: target_language.into(),
            state: JobState::Created,
            stage: JobState::Created,
            progress: 0,
            segments: Vec::new(),
            context: None,
            error: None,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> JobStatus {
        JobStatus {
            id: self.id.clone(),
            state: self.state,
            progress: self.progress,
            current_stage: self.stage,
            error: self.error.clone(),
            video_ref: self.video_ref.clone(),
            source_language: self.source_language.clone(),
            target_language: self.target_language.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Move to the next pipeline stage; skipping or leaving a terminal state fails
    pub fn advance(&mut self, next: JobState, now: DateTime<Utc>) -> Result<(), PipelineError> {
        if self.state.next_stage() != Some(next) {
            return Err(PipelineError::InvalidTransition(format!(
                "job {} cannot go from {} to {}",
                self.id, self.state, next
            )));
        }
        self.state = next;
        self.stage = next;
        self.progress = self.progress.max(next.progress_band().0);
        self.touch(now);
        Ok(())
    }

    /// Raise progress; lower values are ignored
    pub fn set_progress(&mut self, progress: u8, now: DateTime<Utc>) {
        let progress = progress.min(100);
        if progress > self.progress {
            self.progress = progress;
            self.touch(now);
        }
    }

    /// Progress inside the Translating band for `done` of `total` segments
    pub fn translating_progress(done: usize, total: usize) -> u8 {
        let (low, high) = JobState::Translating.progress_band();
        if total == 0 {
            return low;
        }
        let span = u64::from(high - low);
        let done = done.min(total) as u64;
        low + (span * done / total as u64) as u8
    }

    /// Terminal failure at the current stage
    pub fn fail(&mut self, error: &PipelineError, now: DateTime<Utc>) -> Result<(), PipelineError> {
        self.end(JobState::Failed, now)?;
        self.error = Some(JobErrorInfo::new(self.stage, error));
        Ok(())
    }

    /// Terminal cancellation
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), PipelineError> {
        self.end(JobState::Cancelled, now)
    }

    fn end(&mut self, terminal: JobState, now: DateTime<Utc>) -> Result<(), PipelineError> {
        if self.state.is_terminal() {
            return Err(PipelineError::InvalidTransition(format!(
                "job {} is already {}",
                self.id, self.state
            )));
        }
        self.state = terminal;
        self.segments.clear();
        self.context = None;
        self.result = None;
        self.touch(now);
        Ok(())
    }

    /// Store the encoded output and complete the job
    pub fn complete(&mut self, bytes: Vec<u8>, now: DateTime<Utc>) -> Result<(), PipelineError> {
        self.advance(JobState::Completed, now)?;
        self.progress = 100;
        self.result = Some(bytes);
        Ok(())
    }
}

/// First 8 chars of a job id, for logs
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
