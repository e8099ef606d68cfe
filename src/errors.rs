/*!
 * Error types for the vidscribe pipeline.
 *
 * Three layers, all built on thiserror:
 * - `ProviderError`: failures of an external text-generation call, classified
 *   transient or non-transient for the retry policy
 * - `PipelineError`: stage and segment failures raised while a job runs
 * - `JobError`: what the job controller API hands back to its callers
 */

use thiserror::Error;

/// Errors returned by an external text-generation engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The engine asked us to slow down
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// The call did not finish within its deadline
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The engine rejected the request itself (bad input, unknown model, ...)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// 5xx-equivalent failure on the engine side
    #[error("Server error: {status_code} - {message}")]
    ServerError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The response arrived but could not be understood
    #[error("Failed to parse API response: {0}")]
    ParseError(String),
}

impl ProviderError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::Timeout(_) | Self::ServerError { .. } | Self::ConnectionError(_)
        )
    }

    /// Classify a non-success HTTP status into a provider error
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status_code {
            429 => Self::RateLimited(message),
            401 | 403 => Self::AuthenticationError(message),
            408 | 504 => Self::Timeout(message),
            500..=599 => Self::ServerError { status_code, message },
            _ => Self::InvalidRequest(format!("{} - {}", status_code, message)),
        }
    }

    /// Classify a transport-level reqwest failure
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_connect() || error.is_request() {
            Self::ConnectionError(error.to_string())
        } else if error.is_decode() {
            Self::ParseError(error.to_string())
        } else {
            Self::ConnectionError(error.to_string())
        }
    }
}

/// Errors raised while a job moves through its pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// The transcript breaks the ordering or non-negativity rules
    #[error("Malformed transcript: {0}")]
    MalformedTranscript(String),

    /// A segment was asked to change state illegally
    #[error("Invalid segment transition: {0}")]
    InvalidTransition(String),

    /// The global context could not be generated
    #[error("Context build failed: {0}")]
    ContextBuildFailed(#[source] ProviderError),

    /// A single segment could not be translated
    #[error("Translation of segment {index} failed: {source}")]
    SegmentTranslationFailed {
        /// Segment index
        index: usize,
        /// Last error seen for this segment
        #[source]
        source: ProviderError,
    },

    /// The encoder got a segment that is not translated
    #[error("Incomplete transcript: {0}")]
    IncompleteTranscript(String),

    /// The video container is not one we accept
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Audio extraction failed
    #[error("Audio extraction failed: {0}")]
    ExtractionError(String),

    /// Speech-to-text failed
    #[error("Transcription failed: {0}")]
    TranscriptionError(String),

    /// Every segment failed translation
    #[error("No segment could be translated ({0} failed)")]
    NoSegmentsTranslated(usize),

    /// The job waited in the admission queue past its deadline
    #[error("Job waited more than {0}s for an execution slot")]
    AdmissionTimeout(u64),

    /// The job was cancelled before reaching this point
    #[error("Job cancelled")]
    Cancelled,

    /// The job was running when the process stopped
    #[error("Job interrupted by a process restart")]
    Interrupted,

    /// Persisting job state failed
    #[error("Storage error: {0}")]
    Storage(String),
}

impl PipelineError {
    /// Stable snake_case identifier exposed in job status errors
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedTranscript(_) => "malformed_transcript",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::ContextBuildFailed(_) => "context_build_failed",
            Self::SegmentTranslationFailed { .. } => "segment_translation_failed",
            Self::IncompleteTranscript(_) => "incomplete_transcript",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::ExtractionError(_) => "extraction_error",
            Self::TranscriptionError(_) => "transcription_error",
            Self::NoSegmentsTranslated(_) => "no_segments_translated",
            Self::AdmissionTimeout(_) => "admission_timeout",
            Self::Cancelled => "cancelled",
            Self::Interrupted => "interrupted",
            Self::Storage(_) => "storage",
        }
    }
}

/// Errors returned by the job controller API
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    /// No job with this id is known
    #[error("Job not found: {0}")]
    NotFound(String),

    /// The job was rejected at submission
    #[error("Invalid job submission: {0}")]
    InvalidSubmission(String),

    /// The job has not produced its output yet
    #[error("Job {0} is not ready")]
    NotReady(String),

    /// The job ended in failure
    #[error("Job failed during {stage}: {message}")]
    JobFailed {
        /// Stage that failed
        stage: String,
        /// Error kind
        kind: String,
        /// Human readable error
        message: String,
    },

    /// The job was cancelled
    #[error("Job {0} was cancelled")]
    JobCancelled(String),
}
