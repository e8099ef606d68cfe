/*!
 * Job persistence: records written during a run, reloaded by a new controller
 */

use chrono::Utc;

use vidscribe::database::{DatabaseConnection, JobRecord, Repository};
use vidscribe::jobs::{Job, JobState};
use vidscribe::providers::mock::MockGenerator;

use crate::common::{self, StubExtractor, StubTranscriber};

fn open_repository(dir: &tempfile::TempDir) -> Repository {
    Repository::new(DatabaseConnection::new(dir.path().join("jobs.db")).unwrap())
}

#[tokio::test]
async fn test_restore_withCompletedJob_shouldServeSameResult() {
    let dir = common::create_temp_dir().unwrap();

    let first = common::build_controller(
        common::settings(1),
        StubExtractor::new(),
        StubTranscriber::new(common::sample_transcript()),
        MockGenerator::echo(),
    )
    .with_repository(open_repository(&dir));
    let id = first.submit_job("talk.mp4", "en", "es").unwrap();
    common::wait_terminal(&first, &id).await;
    let expected = first.get_result(&id).unwrap();

    let second = common::build_controller(
        common::settings(1),
        StubExtractor::new(),
        StubTranscriber::new(Vec::new()),
        MockGenerator::echo(),
    )
    .with_repository(open_repository(&dir));

    assert_eq!(second.restore().await.unwrap(), 1);
    let status = second.get_status(&id).unwrap();
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.video_ref, "talk.mp4");
    assert_eq!(second.get_result(&id).unwrap(), expected);
}

#[tokio::test]
async fn test_restore_withMidFlightJob_shouldMarkItInterrupted() {
    let dir = common::create_temp_dir().unwrap();
    let repository = open_repository(&dir);

    let now = Utc::now();
    let mut job = Job::new("0123456789abcdef", "talk.mp4", "en", "es", now);
    for stage in [
        JobState::Extracting,
        JobState::Transcribing,
        JobState::BuildingContext,
        JobState::Translating,
    ] {
        job.advance(stage, now).unwrap();
    }
    repository.save_job(&JobRecord::from_job(&job)).await.unwrap();

    let controller = common::build_controller(
        common::settings(1),
        StubExtractor::new(),
        StubTranscriber::new(Vec::new()),
        MockGenerator::echo(),
    )
    .with_repository(repository.clone());

    assert_eq!(controller.restore().await.unwrap(), 1);

    let status = controller.get_status("0123456789abcdef").unwrap();
    assert_eq!(status.state, JobState::Failed);
    let error = status.error.unwrap();
    assert_eq!(error.stage, JobState::Translating);
    assert_eq!(error.kind, "interrupted");

    // The stored record was rewritten too
    let stored = repository.get_job("0123456789abcdef").await.unwrap().unwrap();
    assert_eq!(stored.state, "failed");
    assert_eq!(stored.error_kind.as_deref(), Some("interrupted"));
}

#[tokio::test]
async fn test_release_shouldDeleteStoredRecord() {
    let dir = common::create_temp_dir().unwrap();
    let repository = open_repository(&dir);

    let controller = common::build_controller(
        common::settings(1),
        StubExtractor::new(),
        StubTranscriber::new(common::sample_transcript()),
        MockGenerator::echo(),
    )
    .with_repository(repository.clone());

    let id = controller.submit_job("talk.mp4", "en", "es").unwrap();
    common::wait_terminal(&controller, &id).await;

    controller.release(&id).await.unwrap();
    assert!(repository.get_job(&id).await.unwrap().is_none());
}
