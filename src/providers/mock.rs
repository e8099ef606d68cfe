/*!
 * Mock text generator for testing.
 *
 * - `MockGenerator::echo()` - answers every prompt, translating by tagging text
 * - `MockGenerator::dictionary(..)` - answers from a fixed source → target table
 * - `MockGenerator::scripted(..)` - returns queued results in order
 * - `MockGenerator::failing(..)` - always fails with the given error
 *
 * The mock understands the prompt layout of `translation::prompts`, so it can
 * answer context, single-segment and batched prompts alike.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::TextGenerator;
use crate::translation::prompts::{self, PromptKind};

type Handler = Arc<dyn Fn(&str) -> Result<String, ProviderError> + Send + Sync>;

/// Canned reply used for context prompts
pub const MOCK_CONTEXT_REPLY: &str = "SUMMARY: A short test recording.\nTERMS: none\nREGISTER: informal";

/// Mock generator for testing pipeline behavior
#[derive(Clone)]
pub struct MockGenerator {
    handler: Handler,
    /// Results returned before the handler is consulted
    script: Arc<Mutex<VecDeque<Result<String, ProviderError>>>>,
    /// Request counter shared between clones
    request_count: Arc<AtomicUsize>,
    /// Every prompt received, in arrival order
    prompts: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
}

impl fmt::Debug for MockGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockGenerator")
            .field("request_count", &self.call_count())
            .field("delay", &self.delay)
            .finish()
    }
}

impl MockGenerator {
    /// Create a generator from an arbitrary prompt handler
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            script: Arc::new(Mutex::new(VecDeque::new())),
            request_count: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    /// Translate every segment as `[TRANSLATED] <source>`
    pub fn echo() -> Self {
        Self::with_translator(|text| Ok(format!("[TRANSLATED] {}", text)))
    }

    /// Translate from a fixed table; unknown text is an `InvalidRequest`
    pub fn dictionary(pairs: &[(&str, &str)]) -> Self {
        let table: HashMap<String, String> = pairs
            .iter()
            .map(|(source, target)| (source.to_string(), target.to_string()))
            .collect();
        Self::with_translator(move |text| {
            table
                .get(text)
                .cloned()
                .ok_or_else(|| ProviderError::InvalidRequest(format!("no translation for '{}'", text)))
        })
    }

    /// Answer context prompts with `MOCK_CONTEXT_REPLY` and segment text
    /// (single or batched) through `translate`
    pub fn with_translator<F>(translate: F) -> Self
    where
        F: Fn(&str) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self::new(move |prompt| match prompts::classify_prompt(prompt) {
            PromptKind::Context => Ok(MOCK_CONTEXT_REPLY.to_string()),
            PromptKind::Segment(text) => translate(&text),
            PromptKind::Batch(items) => {
                let mut translated = Vec::with_capacity(items.len());
                for (index, text) in items {
                    translated.push((index, translate(&text)?));
                }
                Ok(Self::generate_batch_response(&translated))
            }
            PromptKind::Unknown => Err(ProviderError::InvalidRequest("unrecognized prompt".to_string())),
        })
    }

    /// Return the queued results first, then behave like `echo()`
    pub fn scripted(results: Vec<Result<String, ProviderError>>) -> Self {
        let mock = Self::echo();
        mock.script.lock().extend(results);
        mock
    }

    /// Always fail with `error`
    pub fn failing(error: ProviderError) -> Self {
        Self::new(move |_| Err(error.clone()))
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue more results ahead of the handler
    pub fn push_results(&self, results: Vec<Result<String, ProviderError>>) {
        self.script.lock().extend(results);
    }

    /// Number of `generate` calls received so far
    pub fn call_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    /// Render a well-formed batched reply
    pub fn generate_batch_response(entries: &[(usize, String)]) -> String {
        let mut response = String::new();
        for (index, text) in entries {
            response.push_str(&prompts::segment_marker(*index));
            response.push('\n');
            response.push_str(text);
            response.push('\n');
        }
        response.push_str(prompts::END_MARKER);
        response
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.script.lock().pop_front();
        match scripted {
            Some(result) => result,
            None => (self.handler)(prompt),
        }
    }

    fn name(&self) -> String {
        "Mock".to_string()
    }
}
