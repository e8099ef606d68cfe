/*!
 * Job-wide translation context.
 *
 * This module provides:
 * - `JobContext`, the global summary and terminology shared by every segment prompt
 * - `ContextBuilder`, which derives it from the full transcript with one generation call
 * - Terminology checks run on finished translations
 */

pub mod builder;
pub mod terms;

use serde::{Deserialize, Serialize};

// Re-export main types
pub use builder::{parse_context_reply, sample_transcript, ContextBuilder, ContextReply};
pub use terms::missing_terms;

/// Global context of one job, read-only once built
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobContext {
    /// Topic, domain and purpose of the content
    pub global_summary: String,
    /// Source language code
    pub source_language: String,
    /// Target language code
    pub target_language: String,
    /// Proper nouns and technical terms, deduplicated, in order of first mention
    pub domain_terms: Vec<String>,
    /// Formal or informal, as described by the model; may be empty
    pub register: String,
}

impl JobContext {
    pub fn new(
        global_summary: impl Into<String>,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
    ) -> Self {
        Self {
            global_summary: global_summary.into(),
            source_language: source_language.into(),
            target_language: target_language.into(),
            domain_terms: Vec::new(),
            register: String::new(),
        }
    }
}
