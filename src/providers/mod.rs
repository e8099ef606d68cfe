/*!
 * Text-generation providers.
 *
 * The pipeline talks to language models through one narrow seam,
 * `TextGenerator::generate(prompt)`. Implementations in this module:
 * - Ollama: local LLM server
 * - OpenAI: chat completions API (and compatible servers)
 * - Anthropic: messages API
 * - Gemini: Google generateContent API
 * - Mock: scriptable generator used by the test suite
 *
 * Providers do not retry. Retries, backoff and timeouts live in
 * `translation::retry` so the context builder and the coordinator share
 * one policy.
 */

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

use crate::app_config::{TranslationConfig, TranslationProvider};
use crate::errors::ProviderError;

/// External text-generation capability
#[async_trait]
pub trait TextGenerator: Send + Sync + Debug {
    /// Generate a completion for a single prompt
    ///
    /// # Errors
    /// Classified `ProviderError`; see `ProviderError::is_transient`.
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Short provider/model label for logs
    fn name(&self) -> String;
}

/// Build the generator selected by the configuration
pub fn build_generator(config: &TranslationConfig) -> Arc<dyn TextGenerator> {
    let model = config.get_model();
    let endpoint = config.get_endpoint();
    let temperature = config.common.temperature;

    match config.provider {
        TranslationProvider::Ollama => Arc::new(ollama::Ollama::new(endpoint, model, temperature)),
        TranslationProvider::OpenAI => Arc::new(openai::OpenAI::new(
            endpoint,
            config.get_api_key(),
            model,
            temperature,
        )),
        TranslationProvider::Anthropic => Arc::new(anthropic::Anthropic::new(
            endpoint,
            config.get_api_key(),
            model,
            temperature,
        )),
        TranslationProvider::Gemini => Arc::new(gemini::Gemini::new(
            endpoint,
            config.get_api_key(),
            model,
            temperature,
        )),
    }
}

/// Shorten provider error bodies before they end up in logs and job errors
pub(crate) fn truncate_body(body: &str) -> String {
    if body.chars().count() > 500 {
        format!("{}...", body.chars().take(500).collect::<String>())
    } else {
        body.to_string()
    }
}

pub mod ollama;
pub mod openai;
pub mod anthropic;
pub mod gemini;
pub mod mock;
