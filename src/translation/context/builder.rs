/*!
 * Context builder.
 *
 * The transcript is sampled down to the token budget, keeping both its
 * opening and its closing, and sent in a single generation call. The reply
 * is parsed into the summary, term list and register of a `JobContext`.
 */

use log::{debug, info};
use std::collections::HashSet;
use std::sync::Arc;

use crate::errors::{PipelineError, ProviderError};
use crate::providers::TextGenerator;
use crate::segment::{self, Segment};
use crate::translation::prompts;
use crate::translation::retry::RetryPolicy;

use super::JobContext;

/// Rough characters-per-token ratio used to size the transcript sample
const CHARS_PER_TOKEN: usize = 4;

/// Placed between the head and tail samples of a long transcript
const ELISION: &str = "\n[...]\n";

/// Parsed reply of the context call
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContextReply {
    pub summary: String,
    pub terms: Vec<String>,
    pub register: String,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Summary,
    Terms,
    Register,
}

/// Builds the `JobContext` of a job
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    generator: Arc<dyn TextGenerator>,
    retry: RetryPolicy,
}

impl ContextBuilder {
    pub fn new(generator: Arc<dyn TextGenerator>, retry: RetryPolicy) -> Self {
        Self { generator, retry }
    }

    /// Derive the job context with exactly one generation call.
    ///
    /// Any call failure left after the retry budget, or a reply without a
    /// summary, is reported as `ContextBuildFailed`.
    pub async fn build(
        &self,
        segments: &[Segment],
        source_language: &str,
        target_language: &str,
        max_tokens: usize,
    ) -> Result<JobContext, PipelineError> {
        segment::validate(segments)?;
        let transcript = sample_transcript(segments, max_tokens);
        debug!(
            "Context sample: {} chars from {} segments (budget {} tokens)",
            transcript.chars().count(),
            segments.len(),
            max_tokens
        );

        let prompt = prompts::build_context_prompt(&transcript, source_language, target_language);
        let reply = self
            .retry
            .generate(self.generator.as_ref(), &prompt)
            .await
            .map_err(PipelineError::ContextBuildFailed)?;

        let parsed = parse_context_reply(&reply);
        if parsed.summary.is_empty() {
            return Err(PipelineError::ContextBuildFailed(ProviderError::ParseError(
                "context reply has no summary".to_string(),
            )));
        }

        let full_text = full_transcript(segments);
        let mut context = JobContext::new(parsed.summary, source_language, target_language);
        context.domain_terms = order_by_first_mention(parsed.terms, &full_text);
        context.register = parsed.register;

        info!(
            "Built context with {} domain terms{}",
            context.domain_terms.len(),
            if context.register.is_empty() {
                String::new()
            } else {
                format!(", register: {}", context.register)
            }
        );
        Ok(context)
    }
}

fn full_transcript(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| s.source_text.trim())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Join the transcript, sampling head and tail when it exceeds `max_tokens`.
///
/// Whole segments are kept from each end while they fit their half of the
/// character budget. When an end segment alone is too long, characters are
/// taken from that end of it; a single segment covering the whole budget
/// contributes both its opening and its closing. The sample never exceeds
/// the budget and the elision marker is left out when it does not fit.
/// The result depends only on its inputs.
pub fn sample_transcript(segments: &[Segment], max_tokens: usize) -> String {
    let full = full_transcript(segments);
    let budget = max_tokens.saturating_mul(CHARS_PER_TOKEN);
    let full_len = full.chars().count();
    if full_len <= budget {
        return full;
    }

    let marker_len = ELISION.chars().count();
    if budget <= marker_len + 1 {
        let head_len = budget.div_ceil(2);
        return format!("{}{}", take_head(&full, head_len), take_tail(&full, budget - head_len));
    }

    let room = budget - marker_len;
    let head_budget = room.div_ceil(2);
    let tail_budget = room - head_budget;
    let texts: Vec<&str> = segments.iter().map(|s| s.source_text.trim()).collect();

    let mut head: Vec<String> = Vec::new();
    let mut used = 0;
    let mut next = 0;
    while next < texts.len() {
        let cost = texts[next].chars().count() + usize::from(!head.is_empty());
        if used + cost > head_budget {
            break;
        }
        head.push(texts[next].to_string());
        used += cost;
        next += 1;
    }
    if head.is_empty() {
        head.push(take_head(texts[0], head_budget));
        next = 1;
    }

    let mut tail: Vec<String> = Vec::new();
    let mut used = 0;
    let mut last = texts.len();
    while last > next {
        let text = texts[last - 1];
        let cost = text.chars().count() + usize::from(!tail.is_empty());
        if used + cost > tail_budget {
            break;
        }
        tail.push(text.to_string());
        used += cost;
        last -= 1;
    }
    if tail.is_empty() {
        // Either the last unused segment is too long, or the head was cut
        // from the only segment that reaches the end
        let text = if last > next { texts[last - 1] } else { texts[next - 1] };
        tail.push(take_tail(text, tail_budget));
    }
    tail.reverse();

    format!("{}{}{}", head.join("\n"), ELISION, tail.join("\n"))
}

fn take_head(text: &str, count: usize) -> String {
    text.chars().take(count).collect()
}

fn take_tail(text: &str, count: usize) -> String {
    let skip = text.chars().count().saturating_sub(count);
    text.chars().skip(skip).collect()
}

/// Split a `SUMMARY:` / `TERMS:` / `REGISTER:` reply into its parts.
///
/// Headers are matched case-insensitively and may be wrapped in markdown
/// emphasis. A reply without any header is taken whole as the summary.
pub fn parse_context_reply(reply: &str) -> ContextReply {
    let mut summary: Vec<&str> = Vec::new();
    let mut terms: Vec<&str> = Vec::new();
    let mut register: Vec<&str> = Vec::new();
    let mut current: Option<Section> = None;
    let mut saw_header = false;

    for line in reply.lines() {
        if let Some((section, rest)) = split_header(line) {
            saw_header = true;
            current = Some(section);
            if rest.is_empty() {
                continue;
            }
            match section {
                Section::Summary => summary.push(rest),
                Section::Terms => terms.push(rest),
                Section::Register => register.push(rest),
            }
            continue;
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match current {
            Some(Section::Summary) => summary.push(line),
            Some(Section::Terms) => terms.push(line),
            Some(Section::Register) => register.push(line),
            None => {}
        }
    }

    if !saw_header {
        return ContextReply {
            summary: reply.trim().to_string(),
            ..ContextReply::default()
        };
    }

    ContextReply {
        summary: summary.join(" ").trim().to_string(),
        terms: parse_terms(&terms.join("\n")),
        register: register.join(" ").trim().to_string(),
    }
}

fn split_header(line: &str) -> Option<(Section, &str)> {
    let trimmed = line.trim().trim_start_matches(['*', '#', '-', ' ']);
    for (label, section) in [
        ("SUMMARY", Section::Summary),
        ("TERMS", Section::Terms),
        ("REGISTER", Section::Register),
    ] {
        let Some(prefix) = trimmed.get(..label.len()) else {
            continue;
        };
        if !prefix.eq_ignore_ascii_case(label) {
            continue;
        }
        let rest = trimmed[label.len()..].trim_start_matches('*');
        if let Some(rest) = rest.strip_prefix(':') {
            return Some((section, rest.trim_start_matches('*').trim()));
        }
    }
    None
}

/// Split a term list, dropping placeholders and case-insensitive duplicates
fn parse_terms(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.split([',', ';', '\n'])
        .map(|term| {
            term.trim()
                .trim_start_matches(['-', '*', '•'])
                .trim()
                .trim_matches(['"', '\'', '`', '“', '”'])
                .trim()
                .trim_end_matches('.')
                .to_string()
        })
        .filter(|term| {
            !term.is_empty() && !matches!(term.to_lowercase().as_str(), "none" | "n/a" | "na")
        })
        .filter(|term| seen.insert(term.to_lowercase()))
        .collect()
}

/// Order terms by their first case-insensitive mention in the transcript.
/// Terms the transcript never mentions keep their relative order at the end.
fn order_by_first_mention(terms: Vec<String>, transcript: &str) -> Vec<String> {
    let haystack = transcript.to_lowercase();
    let mut keyed: Vec<(usize, String)> = terms
        .into_iter()
        .map(|term| {
            let position = haystack.find(&term.to_lowercase()).unwrap_or(usize::MAX);
            (position, term)
        })
        .collect();
    keyed.sort_by_key(|(position, _)| *position);
    keyed.into_iter().map(|(_, term)| term).collect()
}
