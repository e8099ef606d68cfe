/*!
 * Retry policy shared by every external text-generation call.
 *
 * Transient failures (rate limit, timeout, 5xx, dropped connection) are
 * retried with exponential backoff plus random jitter; anything else fails
 * on the first attempt. Each attempt runs under its own deadline, and a
 * blown deadline counts as a transient `Timeout`.
 */

use log::{debug, warn};
use rand::Rng;
use std::time::Duration;

use crate::app_config::{TranslationCommonConfig, TranslationConfig};
use crate::errors::ProviderError;
use crate::providers::TextGenerator;

/// Backoff and timeout settings for external calls
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each further one
    pub base_backoff: Duration,
    /// Ceiling for the exponential part
    pub max_backoff: Duration,
    /// Upper bound of the random delay added on top
    pub jitter: Duration,
    /// Deadline for one attempt
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&TranslationCommonConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(common: &TranslationCommonConfig) -> Self {
        Self {
            max_retries: common.retry_count,
            base_backoff: Duration::from_millis(common.retry_backoff_ms),
            max_backoff: Duration::from_millis(common.max_backoff_ms),
            jitter: Duration::from_millis(common.jitter_ms),
            timeout: Duration::from_secs(common.request_timeout_secs),
        }
    }

    /// Policy for the active provider, honoring its own request timeout
    pub fn for_translation(config: &TranslationConfig) -> Self {
        Self::from_config(&config.common).with_timeout(config.request_timeout())
    }

    /// Override the per-attempt deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override backoff settings
    pub fn with_backoff(mut self, base_backoff: Duration, jitter: Duration) -> Self {
        self.base_backoff = base_backoff;
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `retry` (1-based)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let exponential = self
            .base_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff);

        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        };

        exponential + jitter
    }

    /// Run one prompt through the generator under this policy
    pub async fn generate(&self, generator: &dyn TextGenerator, prompt: &str) -> Result<String, ProviderError> {
        let mut retry = 0;

        loop {
            let attempt = tokio::time::timeout(self.timeout, generator.generate(prompt)).await;
            let error = match attempt {
                Ok(Ok(text)) => {
                    if retry > 0 {
                        debug!("{} succeeded after {} retries", generator.name(), retry);
                    }
                    return Ok(text);
                }
                Ok(Err(error)) => error,
                Err(_) => ProviderError::Timeout(format!("no response within {:?}", self.timeout)),
            };

            if !error.is_transient() {
                debug!("{} failed with a non-transient error: {}", generator.name(), error);
                return Err(error);
            }
            if retry >= self.max_retries {
                warn!("{} gave up after {} retries: {}", generator.name(), retry, error);
                return Err(error);
            }

            retry += 1;
            let delay = self.backoff_for(retry);
            warn!(
                "{} transient failure ({}), retry {}/{} in {:?}",
                generator.name(), error, retry, self.max_retries, delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}
