use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::errors::ProviderError;
use crate::providers::{truncate_body, TextGenerator};

/// Ollama client for interacting with the Ollama API
#[derive(Debug)]
pub struct Ollama {
    /// Base URL of the Ollama API
    base_url: String,
    /// HTTP client for making requests
    client: Client,
    /// Model name
    model: String,
    /// Sampling temperature
    temperature: f32,
}

/// Generate request for the Ollama API
#[derive(Debug, Serialize)]
pub struct GenerationRequest {
    /// Model name to use for generation
    model: String,
    /// Prompt to generate from
    prompt: String,
    /// Additional model parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
    /// Whether to stream the response
    stream: bool,
}

/// Generation options for the Ollama API
#[derive(Debug, Serialize)]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Generation response from the Ollama API
#[derive(Debug, Deserialize)]
pub struct GenerationResponse {
    /// Generated text
    pub response: String,
    /// Whether the generation is complete
    #[serde(default)]
    pub done: bool,
}

impl Ollama {
    /// Create a client from an endpoint such as `localhost`, `localhost:11434`
    /// or `http://gpu-box:11434`
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            base_url: Self::normalize_endpoint(&endpoint.into()),
            client: Client::builder()
                // Force HTTP/1.1 - Ollama uses HTTP/1.1
                .http1_only()
                .pool_idle_timeout(Duration::from_secs(90))
                .tcp_keepalive(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            model: model.into(),
            temperature,
        }
    }

    /// Fill in scheme and default port so that bare host names work
    pub fn normalize_endpoint(endpoint: &str) -> String {
        let with_scheme = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("http://{}", endpoint)
        };

        match Url::parse(&with_scheme) {
            Ok(mut url) => {
                if url.port().is_none() && url.scheme() == "http" {
                    let _ = url.set_port(Some(11434));
                }
                url.as_str().trim_end_matches('/').to_string()
            }
            Err(_) => "http://localhost:11434".to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl TextGenerator for Ollama {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerationRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            options: Some(GenerationOptions { temperature: Some(self.temperature) }),
            stream: false,
        };

        let response = self.client.post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ProviderError::from_reqwest(&e))?;

        if !status.is_success() {
            error!("Ollama API error ({}): {}", status, truncate_body(&body));
            return Err(ProviderError::from_status(status.as_u16(), truncate_body(&body)));
        }

        parse_generation_body(&body)
    }

    fn name(&self) -> String {
        format!("Ollama - {}", self.model)
    }
}

/// Parse a generate body; tolerates the JSONL stream some servers send even
/// with `stream: false`.
fn parse_generation_body(body: &str) -> Result<String, ProviderError> {
    if let Ok(parsed) = serde_json::from_str::<GenerationResponse>(body) {
        return Ok(parsed.response);
    }

    debug!("Ollama response is not a single JSON object, trying line-delimited parse");
    let mut text = String::new();
    let mut any = false;
    for line in body.lines().filter(|l| !l.trim().is_empty()) {
        let chunk: GenerationResponse = serde_json::from_str(line)
            .map_err(|e| ProviderError::ParseError(format!("{}: {}", e, truncate_body(body))))?;
        text.push_str(&chunk.response);
        any = true;
    }

    if any {
        Ok(text)
    } else {
        Err(ProviderError::ParseError("empty response body".to_string()))
    }
}
