/*!
 * Prompt construction for context building and segment translation.
 *
 * This module provides:
 * - Fixed templates for the context brief and translator prompts
 * - Numbered markers for batched translation and their reply parser
 * - Prompt classification used by the mock generator
 */

pub mod markers;
pub mod templates;

// Re-export main types
pub use markers::{parse_batch_response, parse_marked_sections, segment_marker, END_MARKER};
pub use templates::{
    build_batch_prompt, build_context_prompt, build_segment_prompt, clean_translation, language_label,
    PromptTemplate, CONTEXT_PROMPT_HEADER, TEXT_CLOSE, TEXT_OPEN,
};

/// What a rendered prompt asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptKind {
    /// Context brief request
    Context,
    /// One segment; carries its source text
    Segment(String),
    /// Several segments; carries `(index, source text)` pairs
    Batch(Vec<(usize, String)>),
    /// Not produced by this module
    Unknown,
}

/// Recognize a prompt built by this module
pub fn classify_prompt(prompt: &str) -> PromptKind {
    if prompt.starts_with(CONTEXT_PROMPT_HEADER) {
        return PromptKind::Context;
    }

    let sections = parse_marked_sections(prompt);
    if !sections.is_empty() {
        return PromptKind::Batch(sections);
    }

    let open = format!("\n{}\n", TEXT_OPEN);
    let close = format!("\n{}\n", TEXT_CLOSE);
    if let (Some(start), Some(end)) = (prompt.find(&open), prompt.rfind(&close)) {
        let start = start + open.len();
        if start <= end {
            return PromptKind::Segment(prompt[start..end].to_string());
        }
    }

    PromptKind::Unknown
}
