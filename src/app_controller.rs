use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::app_config::Config;
use crate::database::{DatabaseConnection, Repository};
use crate::file_utils::FileManager;
use crate::jobs::{JobController, JobState, JobStatus};
use crate::segment::RawSegment;
use crate::transcript_csv::{self, CsvLayout};

// @module: Application controller for video subtitle jobs

/// Interval between two status polls of a running job
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Name of the summary log written next to processed folders
const ISSUES_LOG_FILE: &str = "vidscribe.issues.log";

/// Name tag of transcript CSV files, as in `talk.transcript.csv`
const TRANSCRIPT_TAG: &str = "transcript";

/// A submitted job and where its subtitles go
struct TrackedJob {
    id: String,
    file_name: String,
    output_path: PathBuf,
    /// Transcript and translation CSV targets, when exporting
    csv_paths: Option<(PathBuf, PathBuf)>,
    bar: ProgressBar,
    outcome: Option<Result<(), String>>,
}

/// Main application controller: turns input paths into jobs and
/// writes their subtitles next to the videos
pub struct Controller {
    // @field: App configuration
    config: Config,
    // @field: Runs the jobs
    jobs: JobController,
    // @field: Also write transcript and translation CSV files
    export_csv: bool,
}

impl Controller {
    // @method: Create a controller wired from configuration, restoring stored jobs
    pub async fn with_config(config: Config) -> Result<Self> {
        let jobs = JobController::from_config(&config)?;
        jobs.restore().await.context("Failed to restore stored jobs")?;
        jobs.sweep_expired(Utc::now()).await;
        Ok(Self::with_jobs(config, jobs))
    }

    /// Create a controller around an existing job controller
    pub fn with_jobs(config: Config, jobs: JobController) -> Self {
        Self { config, jobs, export_csv: false }
    }

    /// Write `<stem>.transcript.csv` and `<stem>.<target>.csv` next to each subtitle file
    pub fn with_csv_export(mut self, enabled: bool) -> Self {
        self.export_csv = enabled;
        self
    }

    pub fn jobs(&self) -> &JobController {
        &self.jobs
    }

    /// Output path of the subtitles for `input_file`
    pub fn output_path_for(&self, input_file: &Path, output_dir: &Path) -> PathBuf {
        FileManager::generate_output_path(input_file, output_dir, &self.config.target_language, "srt")
    }

    /// Transcript and translation CSV paths for `input_file`
    pub fn csv_paths_for(&self, input_file: &Path, output_dir: &Path) -> (PathBuf, PathBuf) {
        (
            FileManager::generate_output_path(input_file, output_dir, TRANSCRIPT_TAG, "csv"),
            FileManager::generate_output_path(input_file, output_dir, &self.config.target_language, "csv"),
        )
    }

    /// Where a video found under `input_dir` gets its subtitles: next to the
    /// video, or at the same relative place below `output_dir`
    pub fn folder_output_dir(input_dir: &Path, video_file: &Path, output_dir: Option<&Path>) -> PathBuf {
        let parent = video_file.parent().unwrap_or(input_dir);
        match output_dir {
            Some(root) => match parent.strip_prefix(input_dir) {
                Ok(relative) => root.join(relative),
                Err(_) => root.to_path_buf(),
            },
            None => parent.to_path_buf(),
        }
    }

    /// Stand-in input path of a CSV file: `talk.transcript.csv` and
    /// `talk.<target>.csv` both name `talk`
    fn csv_source_path(&self, csv_file: &Path) -> PathBuf {
        let stem = csv_file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let base = [TRANSCRIPT_TAG, self.config.target_language.as_str()]
            .iter()
            .find_map(|tag| stem.strip_suffix(&format!(".{}", tag)).map(str::to_string))
            .unwrap_or(stem);
        csv_file.with_file_name(format!("{}.csv", base))
    }

    /// Process one video. Returns the written file, or `None` when the
    /// output already exists and `force_overwrite` is off.
    pub async fn run(&self, input_file: PathBuf, output_dir: PathBuf, force_overwrite: bool) -> Result<Option<PathBuf>> {
        let start_time = Instant::now();
        let multi_progress = MultiProgress::new();

        let Some(tracked) = self.submit(&input_file, &output_dir, None, &multi_progress, force_overwrite)? else {
            return Ok(None);
        };
        self.finish_single(tracked, start_time).await
    }

    /// Process a CSV file instead of a video.
    ///
    /// A transcript CSV is translated without extraction or transcription; a
    /// translation CSV is encoded to subtitles directly.
    pub async fn run_csv(&self, csv_file: PathBuf, output_dir: PathBuf, force_overwrite: bool) -> Result<Option<PathBuf>> {
        let start_time = Instant::now();
        let source = self.csv_source_path(&csv_file);

        match transcript_csv::detect_layout(&csv_file)? {
            CsvLayout::Translation => {
                let output_path = self.output_path_for(&source, &output_dir);
                if output_path.exists() && !force_overwrite {
                    warn!("Skipping {:?}, {:?} already exists (use -f to force overwrite)", csv_file, output_path);
                    return Ok(None);
                }
                let bytes = transcript_csv::srt_from_translated_csv(&csv_file)?;
                FileManager::write_bytes(&output_path, &bytes)?;
                info!("Success: {} ({})", output_path.display(), Self::format_duration(start_time.elapsed()));
                Ok(Some(output_path))
            }
            CsvLayout::Transcript => {
                let transcript = transcript_csv::load_transcript_csv(&csv_file)?;
                info!("Loaded {} transcript segments from {:?}", transcript.len(), csv_file);
                let multi_progress = MultiProgress::new();
                let Some(tracked) =
                    self.submit(&source, &output_dir, Some((csv_file.as_path(), transcript)), &multi_progress, force_overwrite)?
                else {
                    return Ok(None);
                };
                self.finish_single(tracked, start_time).await
            }
        }
    }

    async fn finish_single(&self, mut tracked: TrackedJob, start_time: Instant) -> Result<Option<PathBuf>> {
        self.track(std::slice::from_mut(&mut tracked)).await?;
        match tracked.outcome.take() {
            Some(Ok(())) => {
                info!(
                    "Success: {} ({})",
                    tracked.output_path.display(),
                    Self::format_duration(start_time.elapsed())
                );
                Ok(Some(tracked.output_path))
            }
            Some(Err(message)) => Err(anyhow!("{}: {}", tracked.file_name, message)),
            None => Err(anyhow!("{}: job did not finish", tracked.file_name)),
        }
    }

    /// Run the workflow in folder mode, processing all video files in a directory.
    /// Files that already have translated subtitles are skipped. With an
    /// `output_dir`, the folder layout is mirrored below it.
    pub async fn run_folder(&self, input_dir: PathBuf, output_dir: Option<PathBuf>, force_overwrite: bool) -> Result<()> {
        let start_time = Instant::now();

        if !input_dir.is_dir() {
            return Err(anyhow!("Input directory does not exist: {:?}", input_dir));
        }

        let video_files = FileManager::find_video_files(&input_dir, &self.config.media.allowed_formats)?;
        if video_files.is_empty() {
            return Err(anyhow!("No video files found in directory: {:?}", input_dir));
        }
        info!("Found {} video files in {:?}", video_files.len(), input_dir);

        // Every file is submitted up front; admission control decides how many run
        let multi_progress = MultiProgress::new();
        let mut tracked = Vec::with_capacity(video_files.len());
        let mut skip_count = 0;
        let mut error_count = 0;
        for video_file in &video_files {
            let file_output_dir = Self::folder_output_dir(&input_dir, video_file, output_dir.as_deref());
            match self.submit(video_file, &file_output_dir, None, &multi_progress, force_overwrite) {
                Ok(Some(job)) => tracked.push(job),
                Ok(None) => skip_count += 1,
                Err(e) => {
                    error!("Error submitting {:?}: {}", video_file, e);
                    error_count += 1;
                }
            }
        }

        self.track(&mut tracked).await?;

        let mut success_count = 0;
        for job in &tracked {
            match &job.outcome {
                Some(Ok(())) => success_count += 1,
                Some(Err(message)) => {
                    error!("Error processing file {}: {}", job.file_name, message);
                    error_count += 1;
                }
                None => error_count += 1,
            }
        }

        let summary_message = format!(
            "Folder processing completed: {} processed, {} skipped, {} errors",
            success_count, skip_count, error_count
        );
        info!("{}", summary_message);

        let log_file_path = output_dir.as_deref().unwrap_or(&input_dir).join(ISSUES_LOG_FILE);
        let entry = format!(
            "{} ({} -> {}) {} - Duration: {}",
            input_dir.display(),
            self.config.source_language,
            self.config.target_language,
            summary_message,
            Self::format_duration(start_time.elapsed())
        );
        if let Err(e) = FileManager::append_to_log_file(&log_file_path, &entry) {
            warn!("Failed to write folder logs to file: {}", e);
        }

        Ok(())
    }

    /// Stored job records, oldest first
    pub async fn stored_jobs(config: &Config) -> Result<Vec<JobStatus>> {
        let path = match &config.jobs.database_path {
            Some(path) => path.clone(),
            None => DatabaseConnection::default_database_path()?,
        };
        if !path.exists() {
            return Ok(Vec::new());
        }

        let repository = Repository::new(DatabaseConnection::new(&path)?);
        repository
            .list_jobs()
            .await?
            .into_iter()
            .map(|record| Ok(record.into_job()?.status()))
            .collect()
    }

    /// Submit one input. `transcript` carries the CSV file and its rows when
    /// the transcript is already known.
    fn submit(
        &self,
        input_file: &Path,
        output_dir: &Path,
        transcript: Option<(&Path, Vec<RawSegment>)>,
        multi_progress: &MultiProgress,
        force_overwrite: bool,
    ) -> Result<Option<TrackedJob>> {
        let output_path = self.output_path_for(input_file, output_dir);
        if output_path.exists() && !force_overwrite {
            warn!(
                "Skipping {:?}, {:?} already exists (use -f to force overwrite)",
                input_file, output_path
            );
            return Ok(None);
        }

        let (source, target) = (&self.config.source_language, &self.config.target_language);
        let (id, display_path) = match transcript {
            Some((csv_file, rows)) => (self.jobs.submit_transcript(csv_file, rows, source, target)?, csv_file),
            None => (self.jobs.submit_job(input_file, source, target)?, input_file),
        };
        let csv_paths = self.export_csv.then(|| self.csv_paths_for(input_file, output_dir));

        let file_name = display_path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let bar = multi_progress.add(ProgressBar::new(100));
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {prefix} {msg}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {percent}% {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style.progress_chars("█▓▒░"));
        bar.set_prefix(file_name.clone());
        bar.set_message(JobState::Created.to_string());

        Ok(Some(TrackedJob {
            id,
            file_name,
            output_path,
            csv_paths,
            bar,
            outcome: None,
        }))
    }

    /// Poll jobs until all of them end, writing results as they complete.
    /// Ctrl-C cancels every unfinished job.
    async fn track(&self, tracked: &mut [TrackedJob]) -> Result<()> {
        loop {
            for job in tracked.iter_mut().filter(|job| job.outcome.is_none()) {
                let status = self.jobs.get_status(&job.id)?;
                job.bar.set_position(u64::from(status.progress));
                job.bar.set_message(status.state.to_string());

                if status.state.is_terminal() {
                    let outcome = self.collect(job, &status).await;
                    job.outcome = Some(outcome);
                }
            }

            if tracked.iter().all(|job| job.outcome.is_some()) {
                return Ok(());
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    warn!("Interrupted, cancelling running jobs");
                    for job in tracked.iter().filter(|job| job.outcome.is_none()) {
                        self.jobs.cancel(&job.id)?;
                    }
                }
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
    }

    async fn collect(&self, job: &TrackedJob, status: &JobStatus) -> Result<(), String> {
        let result = self
            .jobs
            .get_result(&job.id)
            .map_err(|e| e.to_string())
            .and_then(|bytes| FileManager::write_bytes(&job.output_path, &bytes).map_err(|e| e.to_string()))
            .and_then(|()| self.export_csv_files(job).map_err(|e| format!("{:#}", e)));

        match &result {
            Ok(()) => job.bar.finish_with_message("done"),
            Err(_) => job.bar.abandon_with_message(status.state.to_string()),
        }

        if let Err(e) = self.jobs.release(&job.id).await {
            warn!("Failed to release job {}: {}", job.id, e);
        }
        result
    }

    fn export_csv_files(&self, job: &TrackedJob) -> Result<()> {
        let Some((transcript_path, translation_path)) = &job.csv_paths else {
            return Ok(());
        };
        let segments = self.jobs.get_segments(&job.id)?;
        transcript_csv::save_transcript_csv(transcript_path, &segments)?;
        transcript_csv::save_translated_csv(translation_path, &segments)?;
        info!("Wrote {} and {}", transcript_path.display(), translation_path.display());
        Ok(())
    }

    // Format duration in a human-readable format
    fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
