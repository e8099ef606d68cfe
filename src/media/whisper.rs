/*!
 * Whisper transcriber for OpenAI-compatible `audio/transcriptions` endpoints.
 */

use async_trait::async_trait;
use log::{debug, error};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{AudioStream, Transcriber};
use crate::app_config::TranscriptionConfig;
use crate::errors::PipelineError;
use crate::language_utils;
use crate::providers::truncate_body;
use crate::segment::RawSegment;

/// `verbose_json` transcription body
#[derive(Debug, Deserialize)]
pub struct VerboseTranscription {
    #[serde(default)]
    pub segments: Vec<TranscriptionSegment>,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptionSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Speech-to-text through a Whisper-style HTTP API
#[derive(Debug)]
pub struct WhisperTranscriber {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl WhisperTranscriber {
    pub fn new(config: &TranscriptionConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    /// Map the response body to ordered raw segments, dropping empty text
    pub fn parse_response(body: &str) -> Result<Vec<RawSegment>, PipelineError> {
        let parsed: VerboseTranscription = serde_json::from_str(body)
            .map_err(|e| PipelineError::TranscriptionError(format!("unreadable transcription response: {}", e)))?;

        Ok(parsed
            .segments
            .into_iter()
            .filter_map(|segment| {
                let text = segment.text.trim();
                (!text.is_empty()).then(|| RawSegment::new(segment.start, segment.end, text))
            })
            .collect())
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: &AudioStream, source_language: &str) -> Result<Vec<RawSegment>, PipelineError> {
        // The API expects ISO 639-1 where one exists
        let language = language_utils::normalize_to_part1_or_part2t(source_language)
            .unwrap_or_else(|_| source_language.to_string());

        let file = Part::bytes(audio.data.to_vec())
            .file_name(audio.file_name.clone())
            .mime_str(&audio.mime_type)
            .map_err(|e| PipelineError::TranscriptionError(format!("invalid audio mime type: {}", e)))?;

        let form = Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("language", language)
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment");

        let url = format!("{}/audio/transcriptions", self.endpoint);
        debug!("Transcribing {} bytes of audio with {}", audio.len(), self.model);

        let mut builder = self.client.post(&url).multipart(form);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| PipelineError::TranscriptionError(format!("request failed: {}", e)))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::TranscriptionError(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            error!("Transcription API error ({}): {}", status, truncate_body(&body));
            return Err(PipelineError::TranscriptionError(format!(
                "{} - {}",
                status.as_u16(),
                truncate_body(&body)
            )));
        }

        Self::parse_response(&body)
    }
}
