/*!
 * # vidscribe
 *
 * Translated subtitles for videos: the audio track is extracted, transcribed
 * into timed segments, summarized into a job-wide context, translated segment
 * by segment with an AI provider, and encoded as SRT.
 *
 * ## Architecture
 *
 * - `jobs`: job lifecycle, admission control, cancellation and retention
 * - `media`: audio extraction (ffmpeg) and speech-to-text (Whisper API)
 * - `translation`: context building, concurrent segment translation, retries
 *   - `translation::prompts`: prompt templates and batch markers
 *   - `translation::context`: global context generation and term checks
 * - `providers`: text generation clients (Ollama, OpenAI, Anthropic, Gemini, mock)
 * - `segment`: transcript segments and their state machine
 * - `subtitle_processor`: SRT encoding and parsing
 * - `transcript_csv`: transcript and translation CSV files
 * - `database`: SQLite persistence of job records
 * - `app_controller`: turns input paths into jobs and writes subtitle files
 * - `app_config`, `file_utils`, `language_utils`, `errors`
 */

// Global lints configuration
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod database;
pub mod errors;
pub mod file_utils;
pub mod jobs;
pub mod language_utils;
pub mod media;
pub mod providers;
pub mod segment;
pub mod subtitle_processor;
pub mod transcript_csv;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use errors::{JobError, PipelineError, ProviderError};
pub use jobs::{CancelToken, ControllerSettings, JobController, JobState, JobStatus};
pub use language_utils::{get_language_name, language_codes_match, normalize_to_part2t};
pub use segment::{RawSegment, Segment, SegmentState};
pub use subtitle_processor::{SubtitleCollection, SubtitleEntry};
