/*!
 * Tests for context building and segment translation against a mock generator
 */

use std::sync::Arc;

use vidscribe::errors::ProviderError;
use vidscribe::providers::mock::MockGenerator;
use vidscribe::segment::{RawSegment, Segment, SegmentState};
use vidscribe::translation::prompts::{classify_prompt, PromptKind};
use vidscribe::translation::{ContextBuilder, JobContext, TranslationCoordinator};

use crate::common;

const BRIEF: &str = "SUMMARY: A product launch talk by Acme about Rust tooling.\nTERMS: Rust, Acme\nREGISTER: formal";

fn briefing_generator() -> MockGenerator {
    MockGenerator::new(|prompt| match classify_prompt(prompt) {
        PromptKind::Context => Ok(BRIEF.to_string()),
        PromptKind::Segment(text) => Ok(format!("<{}>", text)),
        other => Err(ProviderError::InvalidRequest(format!("unexpected prompt: {:?}", other))),
    })
}

fn transcript() -> Vec<Segment> {
    Segment::from_raw(vec![
        RawSegment::new(0.0, 1.0, "Welcome to the Acme keynote"),
        RawSegment::new(1.0, 2.0, "Today we ship Rust tools"),
        RawSegment::new(2.0, 3.0, "Thank you"),
    ])
}

#[tokio::test]
async fn test_context_shouldFlowIntoEverySegmentPrompt() {
    common::init_logging();
    let generator = briefing_generator();
    let shared = Arc::new(generator.clone());

    let context = ContextBuilder::new(shared.clone(), common::fast_retry())
        .build(&transcript(), "en", "fr", 1500)
        .await
        .unwrap();

    assert_eq!(context.global_summary, "A product launch talk by Acme about Rust tooling.");
    // Reordered by first mention in the transcript
    assert_eq!(context.domain_terms, vec!["Acme", "Rust"]);
    assert_eq!(context.register, "formal");

    let translated = TranslationCoordinator::new(shared, common::fast_retry())
        .translate_all(transcript(), &context, 2)
        .await
        .unwrap();

    assert!(translated.iter().all(|segment| segment.state == SegmentState::Translated));
    assert_eq!(translated[1].translated_text.as_deref(), Some("<Today we ship Rust tools>"));

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 4);
    for prompt in &prompts[1..] {
        assert!(prompt.contains("Key terms: Acme, Rust"), "terms missing from: {}", prompt);
        assert!(prompt.contains("A product launch talk by Acme"));
        assert!(prompt.contains("Register: formal"));
    }
}

#[tokio::test]
async fn test_translateAll_withTransientFailure_shouldRetryAndSucceed() {
    common::init_logging();
    let generator = MockGenerator::scripted(vec![Err(ProviderError::RateLimited("slow down".into()))]);
    let context = JobContext::new("Greetings.", "en", "es");
    let segments = Segment::from_raw(vec![RawSegment::new(0.0, 1.0, "Hello")]);

    let translated = TranslationCoordinator::new(Arc::new(generator.clone()), common::fast_retry())
        .translate_all(segments, &context, 1)
        .await
        .unwrap();

    assert_eq!(translated[0].translated_text.as_deref(), Some("[TRANSLATED] Hello"));
    assert_eq!(generator.call_count(), 2);
}

#[tokio::test]
async fn test_translateAll_inBatches_shouldKeepInputOrder() {
    common::init_logging();
    let generator = MockGenerator::echo();
    let context = JobContext::new("Counting.", "en", "es");
    let segments = Segment::from_raw(common::numbered_transcript(5));

    let translated = TranslationCoordinator::new(Arc::new(generator.clone()), common::fast_retry())
        .with_batch_size(2)
        .translate_all(segments, &context, 3)
        .await
        .unwrap();

    let texts: Vec<&str> = translated
        .iter()
        .map(|segment| segment.translated_text.as_deref().unwrap_or_default())
        .collect();
    assert_eq!(
        texts,
        vec![
            "[TRANSLATED] Line 0",
            "[TRANSLATED] Line 1",
            "[TRANSLATED] Line 2",
            "[TRANSLATED] Line 3",
            "[TRANSLATED] Line 4",
        ]
    );
    // Three calls: two pairs and a single
    assert_eq!(generator.call_count(), 3);
}
