/*!
 * End-to-end pipeline tests: extraction → transcription → context →
 * translation → encoding through the job controller
 */

use vidscribe::errors::{JobError, ProviderError};
use vidscribe::jobs::{ControllerSettings, JobState};
use vidscribe::providers::mock::MockGenerator;
use vidscribe::segment::RawSegment;
use vidscribe::subtitle_processor::SubtitleCollection;
use vidscribe::translation::prompts::CONTEXT_PROMPT_HEADER;

use crate::common::{self, StubExtractor, StubTranscriber};

const EXPECTED_SPANISH_SRT: &str = "1\n00:00:00,000 --> 00:00:02,500\nHola mundo\n\n2\n00:00:02,500 --> 00:00:05,000\nEsto es una prueba\n\n";

fn spanish_dictionary() -> MockGenerator {
    MockGenerator::dictionary(&[("Hello world", "Hola mundo"), ("This is a test", "Esto es una prueba")])
}

#[tokio::test]
async fn test_pipeline_withMockedSpanishTranslator_shouldProduceExactSrt() {
    let generator = spanish_dictionary();
    let controller = common::build_controller(
        common::settings(2),
        StubExtractor::new(),
        StubTranscriber::new(common::sample_transcript()),
        generator.clone(),
    );

    let id = controller.submit_job("talk.mp4", "en", "es").unwrap();
    let status = common::wait_terminal(&controller, &id).await;

    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.progress, 100);
    assert!(status.error.is_none());

    let bytes = controller.get_result(&id).unwrap();
    assert_eq!(String::from_utf8(bytes).unwrap(), EXPECTED_SPANISH_SRT);

    // One context call, then one call per segment
    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[0].starts_with(CONTEXT_PROMPT_HEADER));
}

#[tokio::test]
async fn test_pipeline_inBatchedMode_shouldProduceSameBytesWithFewerCalls() {
    let generator = spanish_dictionary();
    let settings = ControllerSettings {
        batch_size: 2,
        ..common::settings(1)
    };
    let controller = common::build_controller(
        settings,
        StubExtractor::new(),
        StubTranscriber::new(common::sample_transcript()),
        generator.clone(),
    );

    let id = controller.submit_job("talk.mp4", "en", "es").unwrap();
    common::wait_terminal(&controller, &id).await;

    assert_eq!(String::from_utf8(controller.get_result(&id).unwrap()).unwrap(), EXPECTED_SPANISH_SRT);
    assert_eq!(generator.call_count(), 2);
}

#[tokio::test]
async fn test_pipeline_withOnePermanentlyFailingSegment_shouldCompleteWithRemainingRecords() {
    let transcript = vec![
        RawSegment::new(0.0, 1.0, "One"),
        RawSegment::new(1.5, 2.5, "Two"),
        RawSegment::new(3.0, 4.0, "Three"),
    ];
    let generator = MockGenerator::dictionary(&[("One", "Uno"), ("Three", "Tres")]);
    let controller = common::build_controller(
        common::settings(1),
        StubExtractor::new(),
        StubTranscriber::new(transcript),
        generator.clone(),
    );

    let id = controller.submit_job("talk.mp4", "en", "es").unwrap();
    let status = common::wait_terminal(&controller, &id).await;
    assert_eq!(status.state, JobState::Completed);

    let srt = String::from_utf8(controller.get_result(&id).unwrap()).unwrap();
    let entries = SubtitleCollection::parse_srt_string(&srt).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!((entries[0].seq_num, entries[0].text.as_str()), (1, "Uno"));
    assert_eq!((entries[1].seq_num, entries[1].text.as_str()), (2, "Tres"));
    assert_eq!(entries[1].start_time_ms, 3000);

    // The failing segment is non-transient: context + 3 segment calls, no retries
    assert_eq!(generator.call_count(), 4);
}

#[tokio::test]
async fn test_pipeline_withEverySegmentFailing_shouldFailInTranslating() {
    let generator = MockGenerator::dictionary(&[]);
    let controller = common::build_controller(
        common::settings(1),
        StubExtractor::new(),
        StubTranscriber::new(common::sample_transcript()),
        generator,
    );

    let id = controller.submit_job("talk.mp4", "en", "es").unwrap();
    let status = common::wait_terminal(&controller, &id).await;

    assert_eq!(status.state, JobState::Failed);
    let error = status.error.unwrap();
    assert_eq!(error.stage, JobState::Translating);
    assert_eq!(error.kind, "no_segments_translated");

    match controller.get_result(&id) {
        Err(JobError::JobFailed { stage, kind, .. }) => {
            assert_eq!(stage, "translating");
            assert_eq!(kind, "no_segments_translated");
        }
        other => panic!("expected JobFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_pipeline_withContextAuthFailure_shouldFailInBuildingContextAfterOneCall() {
    let generator = MockGenerator::failing(ProviderError::AuthenticationError("bad key".into()));
    let controller = common::build_controller(
        common::settings(1),
        StubExtractor::new(),
        StubTranscriber::new(common::sample_transcript()),
        generator.clone(),
    );

    let id = controller.submit_job("talk.mp4", "en", "es").unwrap();
    let status = common::wait_terminal(&controller, &id).await;

    assert_eq!(status.state, JobState::Failed);
    let error = status.error.unwrap();
    assert_eq!(error.stage, JobState::BuildingContext);
    assert_eq!(error.kind, "context_build_failed");
    assert_eq!(generator.call_count(), 1);
}

#[tokio::test]
async fn test_pipeline_withExtractionFailure_shouldFailInExtracting() {
    let generator = MockGenerator::echo();
    let controller = common::build_controller(
        common::settings(1),
        StubExtractor::failing("no audio stream"),
        StubTranscriber::new(common::sample_transcript()),
        generator.clone(),
    );

    let id = controller.submit_job("talk.mp4", "en", "es").unwrap();
    let status = common::wait_terminal(&controller, &id).await;

    let error = status.error.unwrap();
    assert_eq!(error.stage, JobState::Extracting);
    assert_eq!(error.kind, "extraction_error");
    assert!(error.message.contains("no audio stream"));
    assert_eq!(generator.call_count(), 0);
}

#[tokio::test]
async fn test_pipeline_withUnorderedTranscript_shouldFailAsMalformed() {
    let transcript = vec![RawSegment::new(2.0, 3.0, "Later"), RawSegment::new(1.0, 2.0, "Earlier")];
    let controller = common::build_controller(
        common::settings(1),
        StubExtractor::new(),
        StubTranscriber::new(transcript),
        MockGenerator::echo(),
    );

    let id = controller.submit_job("talk.mp4", "en", "es").unwrap();
    let status = common::wait_terminal(&controller, &id).await;

    let error = status.error.unwrap();
    assert_eq!(error.stage, JobState::Transcribing);
    assert_eq!(error.kind, "malformed_transcript");
}
