/*!
 * Media collaborators: audio extraction and speech-to-text.
 *
 * The job controller only sees the two traits below. Implementations:
 * - `ffmpeg::FfmpegExtractor`: pulls a 16 kHz mono WAV track out of a video
 * - `whisper::WhisperTranscriber`: OpenAI-compatible transcription endpoint
 */

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::Debug;
use std::path::Path;

use crate::app_config::MediaConfig;
use crate::errors::PipelineError;
use crate::segment::RawSegment;

pub mod ffmpeg;
pub mod whisper;

pub use ffmpeg::FfmpegExtractor;
pub use whisper::WhisperTranscriber;

/// Extracted audio, kept in memory for the transcriber
#[derive(Debug, Clone, PartialEq)]
pub struct AudioStream {
    pub data: Bytes,
    /// File name announced to the transcriber, extension included
    pub file_name: String,
    pub mime_type: String,
    /// Length in seconds, when it could be measured
    pub duration_secs: Option<f64>,
}

impl AudioStream {
    /// 16-bit PCM WAV audio
    pub fn wav(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            file_name: "audio.wav".to_string(),
            mime_type: "audio/wav".to_string(),
            duration_secs: None,
        }
    }

    pub fn with_duration(mut self, duration_secs: Option<f64>) -> Self {
        self.duration_secs = duration_secs;
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Pulls the audio track out of a video
#[async_trait]
pub trait AudioExtractor: Send + Sync + Debug {
    /// # Errors
    /// `UnsupportedFormat` for rejected inputs, `ExtractionError` otherwise.
    async fn extract(&self, video: &Path) -> Result<AudioStream, PipelineError>;
}

/// Speech-to-text engine
#[async_trait]
pub trait Transcriber: Send + Sync + Debug {
    /// Ordered, timed segments of the recognized speech
    ///
    /// # Errors
    /// `TranscriptionError` on any failure.
    async fn transcribe(&self, audio: &AudioStream, source_language: &str) -> Result<Vec<RawSegment>, PipelineError>;
}

/// Check that a video is a file with an accepted extension and size.
///
/// Returns the file size in bytes.
pub fn check_video_file(path: &Path, config: &MediaConfig) -> Result<u64, PipelineError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .ok_or_else(|| PipelineError::UnsupportedFormat(format!("{} has no file extension", path.display())))?;

    if !config
        .allowed_formats
        .iter()
        .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(&extension))
    {
        return Err(PipelineError::UnsupportedFormat(format!(
            "'.{}' is not one of: {}",
            extension,
            config.allowed_formats.join(", ")
        )));
    }

    let metadata = std::fs::metadata(path)
        .map_err(|e| PipelineError::UnsupportedFormat(format!("cannot read {}: {}", path.display(), e)))?;
    if !metadata.is_file() {
        return Err(PipelineError::UnsupportedFormat(format!("{} is not a file", path.display())));
    }

    let limit = config.max_file_size_mb.saturating_mul(1024 * 1024);
    if metadata.len() > limit {
        return Err(PipelineError::UnsupportedFormat(format!(
            "{} is {} bytes, above the {} MB limit",
            path.display(),
            metadata.len(),
            config.max_file_size_mb
        )));
    }

    Ok(metadata.len())
}
