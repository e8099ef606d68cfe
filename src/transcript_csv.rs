/*!
 * CSV transcript artifacts.
 *
 * Two layouts, times in seconds:
 * - transcript: `start_time,end_time,text`
 * - translation: `start_time,end_time,original_text,translated_text`
 *
 * A translation row with an empty `translated_text` is a segment that was
 * not translated. A transcript CSV can be fed back in place of a video to
 * skip extraction and transcription; a translation CSV turns straight into
 * subtitles.
 */

use anyhow::{anyhow, Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::file_utils::FileManager;
use crate::segment::{RawSegment, Segment, SegmentState};
use crate::subtitle_processor;

const TRANSCRIPT_HEADERS: [&str; 3] = ["start_time", "end_time", "text"];
const TRANSLATION_HEADERS: [&str; 4] = ["start_time", "end_time", "original_text", "translated_text"];

#[derive(Debug, Serialize, Deserialize)]
struct TranscriptRow {
    start_time: f64,
    end_time: f64,
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct TranslationRow {
    start_time: f64,
    end_time: f64,
    original_text: String,
    #[serde(default)]
    translated_text: String,
}

/// Which of the two layouts a CSV file uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvLayout {
    Transcript,
    Translation,
}

/// Tell the layout of a CSV file from its header row
pub fn detect_layout<P: AsRef<Path>>(path: P) -> Result<CsvLayout> {
    let path = path.as_ref();
    let mut reader = reader_for(path)?;
    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read CSV headers: {}", path.display()))?;
    let has = |name: &str| headers.iter().any(|h| h == name);

    if has("original_text") && has("translated_text") {
        Ok(CsvLayout::Translation)
    } else if has("text") {
        Ok(CsvLayout::Transcript)
    } else {
        Err(anyhow!(
            "{} is not a transcript CSV (headers: {})",
            path.display(),
            headers.iter().collect::<Vec<_>>().join(",")
        ))
    }
}

/// Write the source text of `segments` as a transcript CSV
pub fn save_transcript_csv<P: AsRef<Path>>(path: P, segments: &[Segment]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = writer_for(path, &TRANSCRIPT_HEADERS)?;
    for segment in segments {
        writer.serialize(TranscriptRow {
            start_time: segment.start,
            end_time: segment.end,
            text: segment.source_text.clone(),
        })?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write transcript CSV: {}", path.display()))?;
    debug!("Wrote {} transcript rows to {}", segments.len(), path.display());
    Ok(())
}

/// Read a transcript CSV. Rows with blank text are dropped.
pub fn load_transcript_csv<P: AsRef<Path>>(path: P) -> Result<Vec<RawSegment>> {
    let path = path.as_ref();
    let mut reader = reader_for(path)?;
    let mut segments = Vec::new();

    for (row, result) in reader.deserialize::<TranscriptRow>().enumerate() {
        // +2: header row and 1-based numbering
        let record = result.with_context(|| format!("Invalid row {} in {}", row + 2, path.display()))?;
        if record.text.is_empty() {
            continue;
        }
        segments.push(RawSegment::new(record.start_time, record.end_time, record.text));
    }

    debug!("Loaded {} transcript rows from {}", segments.len(), path.display());
    Ok(segments)
}

/// Write every segment with its translation; untranslated segments get an
/// empty `translated_text`
pub fn save_translated_csv<P: AsRef<Path>>(path: P, segments: &[Segment]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = writer_for(path, &TRANSLATION_HEADERS)?;
    for segment in segments {
        let translated_text = match (&segment.state, &segment.translated_text) {
            (SegmentState::Translated, Some(text)) => text.clone(),
            _ => String::new(),
        };
        writer.serialize(TranslationRow {
            start_time: segment.start,
            end_time: segment.end,
            original_text: segment.source_text.clone(),
            translated_text,
        })?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write translation CSV: {}", path.display()))?;
    debug!("Wrote {} translation rows to {}", segments.len(), path.display());
    Ok(())
}

/// Read a translation CSV back into segments. Rows with a translation are
/// `Translated`, the others `Pending`.
pub fn load_translated_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Segment>> {
    let path = path.as_ref();
    let mut reader = reader_for(path)?;
    let mut segments = Vec::new();

    for (row, result) in reader.deserialize::<TranslationRow>().enumerate() {
        let record = result.with_context(|| format!("Invalid row {} in {}", row + 2, path.display()))?;
        let mut segment = Segment::new(segments.len(), record.start_time, record.end_time, record.original_text);
        if !record.translated_text.is_empty() {
            segment.translated_text = Some(record.translated_text);
            segment.state = SegmentState::Translated;
        }
        segments.push(segment);
    }
    Ok(segments)
}

/// Encode the translated rows of a translation CSV as SRT bytes
pub fn srt_from_translated_csv<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let segments = load_translated_csv(path)?;
    let total = segments.len();
    let translated: Vec<Segment> = segments.into_iter().filter(Segment::is_translated).collect();
    if translated.is_empty() {
        return Err(anyhow!("{} has no translated rows", path.display()));
    }
    if translated.len() < total {
        debug!("{}: {} of {} rows untranslated and left out", path.display(), total - translated.len(), total);
    }
    Ok(subtitle_processor::encode(&translated)?)
}

fn reader_for(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))
}

/// Writer with the header row already written, so empty files still carry it
fn writer_for(path: &Path, headers: &[&str]) -> Result<csv::Writer<std::fs::File>> {
    if let Some(parent) = path.parent() {
        FileManager::ensure_dir(parent)?;
    }
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;
    writer.write_record(headers)?;
    Ok(writer)
}
