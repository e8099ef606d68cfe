/*!
 * Job controller behavior: admission control, cancellation, listing and retention
 */

use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;

use vidscribe::errors::JobError;
use vidscribe::jobs::{ControllerSettings, JobState};
use vidscribe::providers::mock::MockGenerator;

use crate::common::{self, StubExtractor, StubTranscriber};

#[tokio::test]
async fn test_admission_withOneJobOverLimit_shouldQueueExactlyOne() {
    let controller = common::build_controller(
        common::settings(2),
        StubExtractor::new(),
        StubTranscriber::new(common::sample_transcript()).with_delay(Duration::from_millis(400)),
        MockGenerator::echo(),
    );

    let ids: Vec<String> = (0..3)
        .map(|i| controller.submit_job(format!("clip{}.mp4", i), "en", "es").unwrap())
        .collect();

    let running = || {
        ids.iter()
            .filter(|id| controller.get_status(id).unwrap().state != JobState::Created)
            .count()
    };
    assert!(common::wait_until(|| running() == 2).await);

    // Still exactly two running a little later, and the queued one is the last submitted
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(running(), 2);
    assert_eq!(controller.get_status(&ids[2]).unwrap().state, JobState::Created);

    for id in &ids {
        assert_eq!(common::wait_terminal(&controller, id).await.state, JobState::Completed);
    }
}

#[tokio::test]
async fn test_cancel_duringTranslating_shouldEndCancelledWithoutResult() {
    let generator = MockGenerator::echo().with_delay(Duration::from_millis(100));
    let settings = ControllerSettings {
        concurrency_limit: 1,
        ..common::settings(1)
    };
    let controller = common::build_controller(
        settings,
        StubExtractor::new(),
        StubTranscriber::new(common::numbered_transcript(8)),
        generator.clone(),
    );

    let id = controller.submit_job("long.mp4", "en", "es").unwrap();
    assert!(common::wait_until(|| controller.get_status(&id).unwrap().state == JobState::Translating).await);

    controller.cancel(&id).unwrap();
    let status = common::wait_terminal(&controller, &id).await;

    assert_eq!(status.state, JobState::Cancelled);
    assert_eq!(status.current_stage, JobState::Translating);
    assert!(status.progress < 100);
    assert!(matches!(controller.get_result(&id), Err(JobError::JobCancelled(_))));
    // Cancelled before every segment was sent
    assert!(generator.call_count() < 1 + 8);
}

#[tokio::test]
async fn test_cancel_whileQueued_shouldEndCancelledInCreated() {
    let controller = common::build_controller(
        common::settings(1),
        StubExtractor::new(),
        StubTranscriber::new(common::sample_transcript()).with_delay(Duration::from_millis(300)),
        MockGenerator::echo(),
    );

    let first = controller.submit_job("first.mp4", "en", "es").unwrap();
    let second = controller.submit_job("second.mp4", "en", "es").unwrap();
    assert!(common::wait_until(|| controller.get_status(&first).unwrap().state == JobState::Transcribing).await);

    controller.cancel(&second).unwrap();
    assert!(common::wait_until(|| controller.get_status(&second).unwrap().state == JobState::Cancelled).await);

    let status = controller.get_status(&second).unwrap();
    assert_eq!(status.current_stage, JobState::Created);
    // The running job is unaffected
    assert!(!controller.get_status(&first).unwrap().state.is_terminal());
    assert_eq!(common::wait_terminal(&controller, &first).await.state, JobState::Completed);
}

#[tokio::test]
async fn test_admission_withQueueDeadline_shouldFailWaitingJob() {
    let settings = ControllerSettings {
        admission_timeout: Some(Duration::from_millis(50)),
        ..common::settings(1)
    };
    let controller = common::build_controller(
        settings,
        StubExtractor::new(),
        StubTranscriber::new(common::sample_transcript()).with_delay(Duration::from_millis(400)),
        MockGenerator::echo(),
    );

    let first = controller.submit_job("first.mp4", "en", "es").unwrap();
    let second = controller.submit_job("second.mp4", "en", "es").unwrap();

    let status = common::wait_terminal(&controller, &second).await;
    assert_eq!(status.state, JobState::Failed);
    let error = status.error.unwrap();
    assert_eq!(error.stage, JobState::Created);
    assert_eq!(error.kind, "admission_timeout");

    assert_eq!(common::wait_terminal(&controller, &first).await.state, JobState::Completed);
}

#[tokio::test]
async fn test_progress_shouldNeverDecrease() {
    let generator = MockGenerator::echo().with_delay(Duration::from_millis(10));
    let settings = ControllerSettings {
        concurrency_limit: 2,
        ..common::settings(1)
    };
    let controller = common::build_controller(
        settings,
        StubExtractor::new(),
        StubTranscriber::new(common::numbered_transcript(10)),
        generator,
    );

    let id = controller.submit_job("talk.mp4", "en", "es").unwrap();
    let mut seen = Vec::new();
    loop {
        let status = controller.get_status(&id).unwrap();
        seen.push(status.progress);
        if status.state.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]), "progress went back: {:?}", seen);
    assert_eq!(seen.last(), Some(&100));
}

#[tokio::test]
async fn test_cancel_onCompletedJob_shouldAcknowledgeAndKeepResult() {
    let controller = common::build_controller(
        common::settings(1),
        StubExtractor::new(),
        StubTranscriber::new(common::sample_transcript()),
        MockGenerator::echo(),
    );

    let id = controller.submit_job("talk.mp4", "en", "es").unwrap();
    common::wait_terminal(&controller, &id).await;

    controller.cancel(&id).unwrap();
    assert_eq!(controller.get_status(&id).unwrap().state, JobState::Completed);
    assert!(controller.get_result(&id).is_ok());
}

#[tokio::test]
async fn test_listJobs_shouldFollowSubmissionOrder() {
    let controller = common::build_controller(
        common::settings(3),
        StubExtractor::new(),
        StubTranscriber::new(common::sample_transcript()),
        MockGenerator::echo(),
    );

    let mut ids = Vec::new();
    for name in ["a.mp4", "b.mp4", "c.mp4"] {
        ids.push(controller.submit_job(name, "en", "es").unwrap());
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let listed: Vec<String> = controller.list_jobs().into_iter().map(|status| status.id).collect();
    assert_eq!(listed, ids);
}

#[tokio::test]
async fn test_sweepExpired_shouldRemoveOnlyOldTerminalJobs() {
    let controller = common::build_controller(
        common::settings(2),
        StubExtractor::new(),
        StubTranscriber::new(common::sample_transcript()),
        MockGenerator::echo(),
    );

    let done = controller.submit_job("done.mp4", "en", "es").unwrap();
    common::wait_terminal(&controller, &done).await;

    // Nothing has aged past the retention period yet
    assert!(controller.sweep_expired(Utc::now()).await.is_empty());

    let later = Utc::now() + ChronoDuration::seconds(controller.settings().retention.as_secs() as i64 + 1);
    assert_eq!(controller.sweep_expired(later).await, vec![done.clone()]);
    assert!(matches!(controller.get_status(&done), Err(JobError::NotFound(_))));
}

#[tokio::test]
async fn test_sweepExpired_shouldKeepRunningJobs() {
    let controller = common::build_controller(
        common::settings(1),
        StubExtractor::new(),
        StubTranscriber::new(common::sample_transcript()).with_delay(Duration::from_millis(200)),
        MockGenerator::echo(),
    );

    let id = controller.submit_job("slow.mp4", "en", "es").unwrap();
    let far_future = Utc::now() + ChronoDuration::days(365);

    assert!(controller.sweep_expired(far_future).await.is_empty());
    assert!(controller.get_status(&id).is_ok());
    common::wait_terminal(&controller, &id).await;
}

#[tokio::test]
async fn test_release_onRunningJob_shouldBeNotReady() {
    let controller = common::build_controller(
        common::settings(1),
        StubExtractor::new(),
        StubTranscriber::new(common::sample_transcript()).with_delay(Duration::from_millis(200)),
        MockGenerator::echo(),
    );

    let id = controller.submit_job("slow.mp4", "en", "es").unwrap();
    assert!(matches!(controller.get_result(&id), Err(JobError::NotReady(_))));
    assert!(matches!(controller.release(&id).await, Err(JobError::NotReady(_))));
    common::wait_terminal(&controller, &id).await;
}
