/*!
 * Database entity models.
 *
 * `JobRecord` maps one row of the `jobs` table. Segments and context are
 * not persisted: a job that was mid-flight when the process stopped is
 * restored as failed.
 */

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::jobs::models::{Job, JobErrorInfo, JobState};

/// One row of the `jobs` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub video_ref: String,
    pub source_language: String,
    pub target_language: String,
    pub state: String,
    pub stage: String,
    pub progress: i64,
    pub error_stage: Option<String>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    /// Encoded subtitles of a completed job
    #[serde(skip)]
    pub result: Option<Vec<u8>>,
    /// RFC 3339
    pub created_at: String,
    /// RFC 3339
    pub updated_at: String,
}

impl JobRecord {
    pub fn from_job(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            video_ref: job.video_ref.clone(),
            source_language: job.source_language.clone(),
            target_language: job.target_language.clone(),
            state: job.state.to_string(),
            stage: job.stage.to_string(),
            progress: i64::from(job.progress),
            error_stage: job.error.as_ref().map(|e| e.stage.to_string()),
            error_kind: job.error.as_ref().map(|e| e.kind.clone()),
            error_message: job.error.as_ref().map(|e| e.message.clone()),
            result: if job.state == JobState::Completed {
                job.result.clone()
            } else {
                None
            },
            created_at: format_timestamp(job.created_at),
            updated_at: format_timestamp(job.updated_at),
        }
    }

    /// Rebuild the job this row describes
    pub fn into_job(self) -> Result<Job> {
        let created_at = parse_timestamp(&self.created_at)?;
        let updated_at = parse_timestamp(&self.updated_at)?;
        let state: JobState = self.state.parse()?;
        let stage: JobState = self.stage.parse()?;

        let error = match (self.error_stage, self.error_kind) {
            (Some(error_stage), Some(kind)) => Some(JobErrorInfo {
                stage: error_stage.parse()?,
                kind,
                message: self.error_message.unwrap_or_default(),
            }),
            _ => None,
        };

        let mut job = Job::new(self.id, self.video_ref, self.source_language, self.target_language, created_at);
        job.state = state;
        job.stage = stage;
        job.progress = self.progress.clamp(0, 100) as u8;
        job.error = error;
        job.result = self.result;
        job.updated_at = updated_at;
        Ok(job)
    }
}

/// Fixed-width RFC 3339 so text order matches time order
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid timestamp in job record: {}", value))?
        .with_timezone(&Utc))
}
