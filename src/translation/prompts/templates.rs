/*!
 * Prompt templates.
 *
 * Prompt construction is pure: the same context and segment always render
 * the same string, and nothing here talks to a provider.
 */

use crate::language_utils;
use crate::segment::Segment;
use crate::translation::context::JobContext;

use super::markers::{segment_marker, END_MARKER};

/// Opening delimiter around the text of a single-segment prompt
pub const TEXT_OPEN: &str = "<<<";
/// Closing delimiter around the text of a single-segment prompt
pub const TEXT_CLOSE: &str = ">>>";

/// First line of every context-brief prompt
pub const CONTEXT_PROMPT_HEADER: &str = "You are preparing a translation brief for the subtitles of a video.";

/// A prompt template with `{placeholder}` variables.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: &'static str,
}

impl PromptTemplate {
    /// Context-brief request sent once per job.
    pub const CONTEXT_BRIEF: &'static str = r#"You are preparing a translation brief for the subtitles of a video.
The transcript below is in {source_language}. The subtitles will be translated into {target_language}.

Transcript:
{transcript}

Reply using exactly this layout and nothing else:
SUMMARY: <two or three sentences describing the topic, domain and purpose of the content>
TERMS: <comma-separated proper nouns and technical terms, spelled exactly as in the transcript, or "none">
REGISTER: <formal or informal, with a few words on the tone>"#;

    /// Shared header for segment translation prompts.
    pub const TRANSLATOR_HEADER: &'static str = r#"You are a professional subtitle translator.

Context about the full content:
{summary}{register}{terms}
Translate from {source_language} to {target_language}.
Maintain the tone, cultural nuances and technical accuracy.
Keep every listed term translated the same way each time it appears."#;

    pub const fn new(template: &'static str) -> Self {
        Self { template }
    }

    /// Replace each `{key}` with its value.
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        vars.iter().fold(self.template.to_string(), |acc, (key, value)| {
            acc.replace(&format!("{{{}}}", key), value)
        })
    }
}

/// `Spanish (es)`, or the bare code if it is not a known ISO code
pub fn language_label(code: &str) -> String {
    match language_utils::get_language_name(code) {
        Ok(name) => format!("{} ({})", name, code),
        Err(_) => code.to_string(),
    }
}

/// Prompt for the context builder's single call
pub fn build_context_prompt(transcript: &str, source_language: &str, target_language: &str) -> String {
    let source = language_label(source_language);
    let target = language_label(target_language);
    PromptTemplate::new(PromptTemplate::CONTEXT_BRIEF).render(&[
        ("source_language", source.as_str()),
        ("target_language", target.as_str()),
        ("transcript", transcript),
    ])
}

fn translator_header(context: &JobContext) -> String {
    let register = if context.register.is_empty() {
        String::new()
    } else {
        format!("\nRegister: {}", context.register)
    };
    let terms = if context.domain_terms.is_empty() {
        String::new()
    } else {
        format!("\nKey terms: {}", context.domain_terms.join(", "))
    };

    let source = language_label(&context.source_language);
    let target = language_label(&context.target_language);
    PromptTemplate::new(PromptTemplate::TRANSLATOR_HEADER).render(&[
        ("source_language", source.as_str()),
        ("target_language", target.as_str()),
        ("register", register.as_str()),
        ("terms", terms.as_str()),
        ("summary", context.global_summary.trim()),
    ])
}

/// Prompt translating exactly one segment
pub fn build_segment_prompt(context: &JobContext, segment: &Segment) -> String {
    format!(
        "{}\nOnly return the translated text, no explanations.\n\nText to translate:\n{}\n{}\n{}\n\nTranslation:",
        translator_header(context),
        TEXT_OPEN,
        segment.source_text.trim(),
        TEXT_CLOSE
    )
}

/// Prompt translating several segments, each behind its own numbered marker
pub fn build_batch_prompt(context: &JobContext, segments: &[&Segment]) -> String {
    let mut prompt = translator_header(context);
    prompt.push_str(
        "\nEach subtitle below starts on the line after its marker. Reply with the same markers, \
         in the same order, each followed by the translation only. Finish with the end marker line.\n\n",
    );
    for segment in segments {
        prompt.push_str(&segment_marker(segment.index));
        prompt.push('\n');
        prompt.push_str(segment.source_text.trim());
        prompt.push('\n');
    }
    prompt.push_str(END_MARKER);
    prompt
}

/// Tidy a single-segment reply: drop echoed labels, delimiters and quotes
pub fn clean_translation(response: &str) -> String {
    let mut text = response.trim();

    for label in ["Translation:", "Translated text:"] {
        if text.get(..label.len()).is_some_and(|prefix| prefix.eq_ignore_ascii_case(label)) {
            text = text[label.len()..].trim_start();
        }
    }

    if let Some(inner) = text.strip_prefix(TEXT_OPEN).and_then(|t| t.strip_suffix(TEXT_CLOSE)) {
        text = inner.trim();
    }

    for (open, close) in [('"', '"'), ('“', '”'), ('«', '»')] {
        if text.chars().count() >= 2 && text.starts_with(open) && text.ends_with(close) {
            let inner = &text[open.len_utf8()..text.len() - close.len_utf8()];
            if !inner.contains(open) && !inner.contains(close) {
                text = inner.trim();
            }
        }
    }

    text.to_string()
}
