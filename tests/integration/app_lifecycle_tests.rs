/*!
 * Full app lifecycle tests: input paths in, subtitle files out
 */

use chrono::Utc;
use std::fs;

use vidscribe::app_config::Config;
use vidscribe::app_controller::Controller;
use vidscribe::database::{DatabaseConnection, JobRecord, Repository};
use vidscribe::jobs::{Job, JobState};
use vidscribe::providers::mock::MockGenerator;
use vidscribe::transcript_csv;

use crate::common::{self, StubExtractor, StubTranscriber};

fn test_controller(generator: MockGenerator) -> Controller {
    let config = Config::default();
    let jobs = common::build_controller(
        common::settings(2),
        StubExtractor::new(),
        StubTranscriber::new(common::sample_transcript()),
        generator,
    );
    Controller::with_jobs(config, jobs)
}

#[tokio::test]
async fn test_run_withVideoFile_shouldWriteTargetLanguageSrtNextToIt() {
    let temp_dir = common::create_temp_dir().unwrap();
    let video = common::create_test_video(temp_dir.path(), "talk.mp4").unwrap();
    let controller = test_controller(MockGenerator::dictionary(&[
        ("Hello world", "Hola mundo"),
        ("This is a test", "Esto es una prueba"),
    ]));

    let written = controller
        .run(video.clone(), temp_dir.path().to_path_buf(), false)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(written, temp_dir.path().join("talk.es.srt"));
    let content = fs::read_to_string(&written).unwrap();
    assert!(content.starts_with("1\n00:00:00,000 --> 00:00:02,500\nHola mundo\n\n"));
    // The finished job is released once its file is written
    assert!(controller.jobs().list_jobs().is_empty());
}

#[tokio::test]
async fn test_run_withExistingOutput_shouldSkipUnlessForced() {
    let temp_dir = common::create_temp_dir().unwrap();
    let video = common::create_test_video(temp_dir.path(), "talk.mp4").unwrap();
    let existing = temp_dir.path().join("talk.es.srt");
    fs::write(&existing, "keep me").unwrap();
    let controller = test_controller(MockGenerator::echo());

    let skipped = controller.run(video.clone(), temp_dir.path().to_path_buf(), false).await.unwrap();
    assert!(skipped.is_none());
    assert_eq!(fs::read_to_string(&existing).unwrap(), "keep me");

    controller.run(video, temp_dir.path().to_path_buf(), true).await.unwrap();
    assert!(fs::read_to_string(&existing).unwrap().contains("[TRANSLATED] Hello world"));
}

#[tokio::test]
async fn test_run_withFailingJob_shouldReturnErrorAndWriteNothing() {
    let temp_dir = common::create_temp_dir().unwrap();
    let video = common::create_test_video(temp_dir.path(), "talk.mp4").unwrap();
    let controller = test_controller(MockGenerator::dictionary(&[]));

    let result = controller.run(video, temp_dir.path().to_path_buf(), false).await;

    assert!(result.is_err());
    assert!(!temp_dir.path().join("talk.es.srt").exists());
}

#[tokio::test]
async fn test_runFolder_shouldProcessEveryVideoAndLogSummary() {
    let temp_dir = common::create_temp_dir().unwrap();
    fs::create_dir_all(temp_dir.path().join("season1")).unwrap();
    common::create_test_video(temp_dir.path(), "intro.mp4").unwrap();
    common::create_test_video(&temp_dir.path().join("season1"), "episode.mkv").unwrap();
    fs::write(temp_dir.path().join("notes.txt"), "not a video").unwrap();
    let controller = test_controller(MockGenerator::echo());

    controller.run_folder(temp_dir.path().to_path_buf(), None, false).await.unwrap();

    assert!(temp_dir.path().join("intro.es.srt").exists());
    assert!(temp_dir.path().join("season1/episode.es.srt").exists());
    let log = fs::read_to_string(temp_dir.path().join("vidscribe.issues.log")).unwrap();
    assert!(log.contains("2 processed, 0 skipped, 0 errors"));
}

#[tokio::test]
async fn test_runFolder_withOutputDir_shouldMirrorLayoutThere() {
    let input_dir = common::create_temp_dir().unwrap();
    let output_dir = common::create_temp_dir().unwrap();
    fs::create_dir_all(input_dir.path().join("season1")).unwrap();
    common::create_test_video(input_dir.path(), "intro.mp4").unwrap();
    common::create_test_video(&input_dir.path().join("season1"), "episode.mkv").unwrap();
    let controller = test_controller(MockGenerator::echo());

    controller
        .run_folder(input_dir.path().to_path_buf(), Some(output_dir.path().to_path_buf()), false)
        .await
        .unwrap();

    assert!(output_dir.path().join("intro.es.srt").exists());
    assert!(output_dir.path().join("season1/episode.es.srt").exists());
    assert!(!input_dir.path().join("intro.es.srt").exists());
    assert!(!input_dir.path().join("season1/episode.es.srt").exists());
    assert!(output_dir.path().join("vidscribe.issues.log").exists());
}

#[tokio::test]
async fn test_run_withCsvExport_shouldWriteTranscriptAndTranslationCsv() {
    let temp_dir = common::create_temp_dir().unwrap();
    let video = common::create_test_video(temp_dir.path(), "talk.mp4").unwrap();
    let controller = test_controller(MockGenerator::dictionary(&[
        ("Hello world", "Hola mundo"),
        ("This is a test", "Esto es una prueba"),
    ]))
    .with_csv_export(true);

    controller.run(video, temp_dir.path().to_path_buf(), false).await.unwrap();

    let transcript = transcript_csv::load_transcript_csv(temp_dir.path().join("talk.transcript.csv")).unwrap();
    assert_eq!(transcript, common::sample_transcript());

    let translated = transcript_csv::load_translated_csv(temp_dir.path().join("talk.es.csv")).unwrap();
    assert_eq!(translated.len(), 2);
    assert_eq!(translated[1].translated_text.as_deref(), Some("Esto es una prueba"));
}

#[tokio::test]
async fn test_runCsv_withTranscriptCsv_shouldTranslateItsRowsNotTheVideo() {
    let temp_dir = common::create_temp_dir().unwrap();
    let csv_path = temp_dir.path().join("talk.transcript.csv");
    fs::write(&csv_path, "start_time,end_time,text\n1.0,2.0,Edited line\n").unwrap();
    // The stub transcriber would produce the sample transcript instead
    let controller = test_controller(MockGenerator::dictionary(&[("Edited line", "Línea editada")]));

    let written = controller
        .run_csv(csv_path, temp_dir.path().to_path_buf(), false)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(written, temp_dir.path().join("talk.es.srt"));
    assert_eq!(
        fs::read_to_string(&written).unwrap(),
        "1\n00:00:01,000 --> 00:00:02,000\nLínea editada\n\n"
    );
}

#[tokio::test]
async fn test_runCsv_withTranslationCsv_shouldWriteSrtWithoutJobs() {
    let temp_dir = common::create_temp_dir().unwrap();
    let csv_path = temp_dir.path().join("talk.es.csv");
    fs::write(
        &csv_path,
        "start_time,end_time,original_text,translated_text\n0,2.5,Hello world,Hola mundo\n",
    )
    .unwrap();
    let controller = test_controller(MockGenerator::dictionary(&[]));

    let written = controller
        .run_csv(csv_path, temp_dir.path().to_path_buf(), false)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(written, temp_dir.path().join("talk.es.srt"));
    assert!(fs::read_to_string(&written).unwrap().contains("Hola mundo"));
    assert!(controller.jobs().list_jobs().is_empty());
}

#[tokio::test]
async fn test_runCsv_withEmptyTranscriptCsv_shouldFail() {
    let temp_dir = common::create_temp_dir().unwrap();
    let csv_path = temp_dir.path().join("talk.transcript.csv");
    transcript_csv::save_transcript_csv(&csv_path, &[]).unwrap();
    let controller = test_controller(MockGenerator::echo());

    assert!(controller.run_csv(csv_path, temp_dir.path().to_path_buf(), false).await.is_err());
    assert!(!temp_dir.path().join("talk.es.srt").exists());
}

#[tokio::test]
async fn test_runFolder_withoutVideos_shouldFail() {
    let temp_dir = common::create_temp_dir().unwrap();
    fs::write(temp_dir.path().join("notes.txt"), "not a video").unwrap();
    let controller = test_controller(MockGenerator::echo());

    assert!(controller.run_folder(temp_dir.path().to_path_buf(), None, false).await.is_err());
}

#[test]
fn test_storedJobs_withDatabase_shouldListPersistedStatuses() {
    let temp_dir = common::create_temp_dir().unwrap();
    let db_path = temp_dir.path().join("jobs.db");
    let mut config = Config::default();
    config.jobs.database_path = Some(db_path.clone());

    let result = tokio_test::block_on(async {
        // No database file yet
        assert!(Controller::stored_jobs(&config).await?.is_empty());

        let repository = Repository::new(DatabaseConnection::new(&db_path)?);
        let job = Job::new("feedface00000000", "talk.mp4", "en", "es", Utc::now());
        repository.save_job(&JobRecord::from_job(&job)).await?;

        Controller::stored_jobs(&config).await
    });

    let statuses = result.unwrap();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].id, "feedface00000000");
    assert_eq!(statuses[0].state, JobState::Created);
}
