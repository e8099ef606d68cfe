use std::fmt;
use std::fs;
use std::path::Path;
use regex::Regex;
use once_cell::sync::Lazy;
use anyhow::{Result, Context, anyhow};
use log::{debug, warn};

use crate::errors::PipelineError;
use crate::segment::{Segment, SegmentState};

// @module: SRT encoding and parsing

// @const: SRT timestamp regex
static TIMESTAMP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{2,}):(\d{2}):(\d{2})[,.](\d{3})\s+-->\s+(\d{2,}):(\d{2}):(\d{2})[,.](\d{3})")
        .expect("timestamp regex is valid")
});

// @struct: Single subtitle record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleEntry {
    // @field: Sequence number (1-based)
    pub seq_num: usize,

    // @field: Start time in ms
    pub start_time_ms: u64,

    // @field: End time in ms
    pub end_time_ms: u64,

    // @field: Subtitle text, one element per line
    pub text: String,
}

impl SubtitleEntry {
    pub fn new(seq_num: usize, start_time_ms: u64, end_time_ms: u64, text: impl Into<String>) -> Self {
        SubtitleEntry {
            seq_num,
            start_time_ms,
            end_time_ms,
            text: text.into(),
        }
    }

    /// Convert seconds to whole milliseconds, truncating the sub-millisecond part.
    ///
    /// Products like `1.001 * 1000.0` land a hair below the integer they
    /// represent, so a tiny epsilon is added before flooring.
    pub fn seconds_to_ms(seconds: f64) -> u64 {
        if !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }
        (seconds * 1000.0 + 1e-6).floor() as u64
    }

    /// Format a timestamp in milliseconds to SRT format (HH:MM:SS,mmm)
    pub fn format_timestamp(ms: u64) -> String {
        let hours = ms / 3_600_000;
        let minutes = (ms % 3_600_000) / 60_000;
        let seconds = (ms % 60_000) / 1_000;
        let millis = ms % 1_000;

        format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
    }

    /// Parse an SRT timestamp to milliseconds
    pub fn parse_timestamp(timestamp: &str) -> Result<u64> {
        let parts: Vec<&str> = timestamp.trim().split(&[':', ',', '.'][..]).collect();

        if parts.len() != 4 {
            return Err(anyhow!("Invalid timestamp format: {}", timestamp));
        }

        let hours: u64 = parts[0].parse().context("Failed to parse hours")?;
        let minutes: u64 = parts[1].parse().context("Failed to parse minutes")?;
        let seconds: u64 = parts[2].parse().context("Failed to parse seconds")?;
        let millis: u64 = parts[3].parse().context("Failed to parse milliseconds")?;

        if minutes >= 60 || seconds >= 60 || millis >= 1000 {
            return Err(anyhow!("Invalid time components in timestamp: {}", timestamp));
        }

        Ok(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis)
    }

    /// Drop blank lines inside a subtitle so the text cannot end its block early
    pub fn normalize_text(text: &str) -> String {
        text.lines()
            .map(str::trim_end)
            .filter(|line| !line.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for SubtitleEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.seq_num)?;
        writeln!(
            f,
            "{} --> {}",
            Self::format_timestamp(self.start_time_ms),
            Self::format_timestamp(self.end_time_ms)
        )?;
        writeln!(f, "{}", self.text)?;
        writeln!(f)
    }
}

/// Ordered list of subtitle records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubtitleCollection {
    /// Records in playback order
    pub entries: Vec<SubtitleEntry>,
}

impl SubtitleCollection {
    /// Build records from translated segments.
    ///
    /// Strict: every segment must be `Translated` with non-blank text. Records
    /// are numbered 1..N in input order; the input is never re-sorted.
    pub fn from_segments(segments: &[Segment]) -> Result<Self, PipelineError> {
        let mut entries = Vec::with_capacity(segments.len());

        for (position, segment) in segments.iter().enumerate() {
            if segment.state != SegmentState::Translated {
                return Err(PipelineError::IncompleteTranscript(format!(
                    "segment {} is {}",
                    segment.index, segment.state
                )));
            }

            let text = segment
                .translated_text
                .as_deref()
                .map(SubtitleEntry::normalize_text)
                .unwrap_or_default();
            if text.is_empty() {
                return Err(PipelineError::IncompleteTranscript(format!(
                    "segment {} has no translated text",
                    segment.index
                )));
            }

            entries.push(SubtitleEntry::new(
                position + 1,
                SubtitleEntry::seconds_to_ms(segment.start),
                SubtitleEntry::seconds_to_ms(segment.end),
                text,
            ));
        }

        Ok(Self { entries })
    }

    /// Render the collection as SRT text
    pub fn to_srt_string(&self) -> String {
        self.entries.iter().map(|entry| entry.to_string()).collect()
    }

    /// Write subtitles to an SRT file
    pub fn write_to_srt<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_srt(path, self.to_srt_string().as_bytes())
    }

    /// Load and parse an SRT file
    pub fn load_srt<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read subtitle file: {}", path.display()))?;
        Ok(Self { entries: Self::parse_srt_string(&content)? })
    }

    /// Parse SRT text into records, keeping the order found in the text
    pub fn parse_srt_string(content: &str) -> Result<Vec<SubtitleEntry>> {
        let mut entries = Vec::new();

        let mut current_seq_num: Option<usize> = None;
        let mut current_times: Option<(u64, u64)> = None;
        let mut current_text: Vec<&str> = Vec::new();

        let mut flush = |seq: Option<usize>, times: Option<(u64, u64)>, text: &mut Vec<&str>| {
            if let (Some(seq_num), Some((start, end))) = (seq, times) {
                if text.is_empty() {
                    warn!("Skipping empty subtitle entry {}", seq_num);
                } else {
                    entries.push(SubtitleEntry::new(seq_num, start, end, text.join("\n")));
                }
            }
            text.clear();
        };

        for (line_number, line) in content.lines().enumerate() {
            let trimmed = line.trim();

            if trimmed.is_empty() {
                if current_times.is_some() {
                    flush(current_seq_num.take(), current_times.take(), &mut current_text);
                }
                continue;
            }

            if current_seq_num.is_none() {
                match trimmed.trim_start_matches('\u{feff}').parse::<usize>() {
                    Ok(num) => current_seq_num = Some(num),
                    Err(_) => warn!("Unexpected text at line {}: {}", line_number + 1, trimmed),
                }
                continue;
            }

            if current_times.is_none() {
                let caps = TIMESTAMP_REGEX
                    .captures(trimmed)
                    .ok_or_else(|| anyhow!("Invalid timestamp line {}: {}", line_number + 1, trimmed))?;
                current_times = Some((Self::captured_ms(&caps, 1)?, Self::captured_ms(&caps, 5)?));
                continue;
            }

            current_text.push(trimmed);
        }
        flush(current_seq_num, current_times, &mut current_text);

        if entries.is_empty() {
            return Err(anyhow!("No valid subtitle entries were found in the SRT content"));
        }

        debug!("Parsed {} subtitle entries", entries.len());
        Ok(entries)
    }

    fn captured_ms(caps: &regex::Captures, start_idx: usize) -> Result<u64> {
        let mut parts = [0u64; 4];
        for (offset, part) in parts.iter_mut().enumerate() {
            *part = caps
                .get(start_idx + offset)
                .map(|m| m.as_str())
                .unwrap_or("0")
                .parse()
                .context("Failed to parse timestamp component")?;
        }
        let [hours, minutes, seconds, millis] = parts;
        Ok((hours * 3600 + minutes * 60 + seconds) * 1000 + millis)
    }
}

/// Encode translated segments into SRT bytes.
///
/// Fails with `IncompleteTranscript` if any segment is not translated; callers
/// that want a partial file filter failed segments out first.
pub fn encode(segments: &[Segment]) -> Result<Vec<u8>, PipelineError> {
    Ok(SubtitleCollection::from_segments(segments)?.to_srt_string().into_bytes())
}

/// Write encoded subtitle bytes, creating parent directories as needed
pub fn save_srt<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    fs::write(path, bytes)
        .with_context(|| format!("Failed to create subtitle file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::merge_translation;

    fn translated(index: usize, start: f64, end: f64, text: &str) -> Segment {
        let mut segment = Segment::new(index, start, end, "source");
        merge_translation(&mut segment, text).unwrap();
        segment
    }

    #[test]
    fn test_secondsToMs_withSubMillisecondPart_shouldTruncate() {
        assert_eq!(SubtitleEntry::seconds_to_ms(65.4006), 65_400);
        assert_eq!(SubtitleEntry::seconds_to_ms(1.0019), 1_001);
        assert_eq!(SubtitleEntry::seconds_to_ms(1.001), 1_001);
        assert_eq!(SubtitleEntry::seconds_to_ms(2.5), 2_500);
        assert_eq!(SubtitleEntry::seconds_to_ms(0.0), 0);
    }

    #[test]
    fn test_formatTimestamp_shouldZeroPad() {
        assert_eq!(SubtitleEntry::format_timestamp(65_400), "00:01:05,400");
        assert_eq!(SubtitleEntry::format_timestamp(5_025_678), "01:23:45,678");
    }

    #[test]
    fn test_encode_withStart654006_shouldRender010540() {
        let bytes = encode(&[translated(0, 65.4006, 66.0, "Hola")]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("1\n00:01:05,400 --> 00:01:06,000\nHola\n\n"));
    }

    #[test]
    fn test_encode_withPendingSegment_shouldFailIncomplete() {
        let segments = vec![translated(0, 0.0, 1.0, "Hola"), Segment::new(1, 1.0, 2.0, "pending")];
        assert!(matches!(encode(&segments), Err(PipelineError::IncompleteTranscript(_))));
    }

    #[test]
    fn test_encode_withDoubleNewline_shouldCollapse() {
        let bytes = encode(&[translated(0, 0.0, 1.0, "line one\n\nline two\r\n\r\n\nline three")]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "1\n00:00:00,000 --> 00:00:01,000\nline one\nline two\nline three\n\n");
    }

    #[test]
    fn test_parseSrtString_withCrlf_shouldParseEntries() {
        let content = "1\r\n00:00:01,000 --> 00:00:02,500\r\nHello\r\nthere\r\n\r\n2\r\n00:00:03,000 --> 00:00:04,000\r\nBye\r\n";
        let entries = SubtitleCollection::parse_srt_string(content).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "Hello\nthere");
        assert_eq!(entries[1].start_time_ms, 3_000);
    }

    #[test]
    fn test_parseSrtString_withGarbage_shouldFail() {
        assert!(SubtitleCollection::parse_srt_string("").is_err());
        assert!(SubtitleCollection::parse_srt_string("1\nnot a timestamp\ntext\n").is_err());
    }
}
