/*!
 * ffmpeg audio extractor.
 */

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{debug, error, warn};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

use super::{check_video_file, AudioExtractor, AudioStream};
use crate::app_config::MediaConfig;
use crate::errors::PipelineError;

/// Extracts a 16 kHz mono PCM WAV track with ffmpeg
#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    config: MediaConfig,
}

impl FfmpegExtractor {
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    /// Probe that the configured ffmpeg binary runs
    pub async fn check_available(&self) -> Result<()> {
        let output = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .output()
            .await
            .map_err(|e| anyhow!("ffmpeg not found at '{}': {}", self.config.ffmpeg_path, e))?;

        if !output.status.success() {
            return Err(anyhow!("'{} -version' exited with {}", self.config.ffmpeg_path, output.status));
        }
        Ok(())
    }

    /// Duration of a media file in seconds, read with ffprobe
    pub async fn get_audio_duration(&self, path: &Path) -> Result<f64> {
        let output = Command::new(&self.config.ffprobe_path)
            .args(["-v", "error", "-show_entries", "format=duration", "-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| anyhow!("ffprobe not found at '{}': {}", self.config.ffprobe_path, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("ffprobe failed: {}", Self::filter_ffmpeg_stderr(&stderr)));
        }
        Self::parse_duration(&String::from_utf8_lossy(&output.stdout))
    }

    /// Parse ffprobe's bare `format=duration` output
    fn parse_duration(stdout: &str) -> Result<f64> {
        let value = stdout.trim();
        let duration: f64 = value
            .parse()
            .map_err(|_| anyhow!("ffprobe reported no duration: '{}'", value))?;
        if !duration.is_finite() || duration < 0.0 {
            return Err(anyhow!("ffprobe reported invalid duration {}", duration));
        }
        Ok(duration)
    }

    /// Keep the lines of ffmpeg's stderr that describe the failure
    fn filter_ffmpeg_stderr(stderr: &str) -> String {
        let relevant: Vec<&str> = stderr
            .lines()
            .map(str::trim)
            .filter(|line| {
                let lower = line.to_lowercase();
                lower.contains("error") || lower.contains("invalid") || lower.contains("no such file")
                    || lower.contains("does not contain")
            })
            .collect();

        if relevant.is_empty() {
            stderr.lines().last().unwrap_or("").trim().to_string()
        } else {
            relevant.join("; ")
        }
    }
}

#[async_trait]
impl AudioExtractor for FfmpegExtractor {
    async fn extract(&self, video: &Path) -> Result<AudioStream, PipelineError> {
        let size = check_video_file(video, &self.config)?;
        debug!("Extracting audio from {:?} ({} bytes)", video, size);

        let work_dir = tempfile::tempdir()
            .map_err(|e| PipelineError::ExtractionError(format!("cannot create temp dir: {}", e)))?;
        let output_path = work_dir.path().join("audio.wav");

        let ffmpeg_future = Command::new(&self.config.ffmpeg_path)
            .arg("-i")
            .arg(video)
            .args(["-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1", "-y"])
            .arg(&output_path)
            .kill_on_drop(true)
            .output();

        let timeout = Duration::from_secs(self.config.extraction_timeout_secs);
        let output = tokio::select! {
            result = ffmpeg_future => {
                result.map_err(|e| PipelineError::ExtractionError(format!("failed to run ffmpeg: {}", e)))?
            },
            _ = tokio::time::sleep(timeout) => {
                return Err(PipelineError::ExtractionError(format!("ffmpeg timed out after {:?}", timeout)));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let filtered = Self::filter_ffmpeg_stderr(&stderr);
            error!("Audio extraction failed: {}", filtered);
            return Err(PipelineError::ExtractionError(filtered));
        }

        let data = tokio::fs::read(&output_path)
            .await
            .map_err(|e| PipelineError::ExtractionError(format!("ffmpeg produced no audio: {}", e)))?;
        if data.is_empty() {
            return Err(PipelineError::ExtractionError("extracted audio is empty".to_string()));
        }

        let duration = match self.get_audio_duration(&output_path).await {
            Ok(secs) => Some(secs),
            Err(e) => {
                warn!("Could not measure extracted audio: {}", e);
                None
            }
        };

        debug!("Extracted {} bytes of audio ({:?} s)", data.len(), duration);
        Ok(AudioStream::wav(data).with_duration(duration))
    }
}
