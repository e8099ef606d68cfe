/*!
 * Segment model.
 *
 * A segment is one timed unit of transcript text together with its
 * translation state. Segments are created in bulk from the transcriber
 * output, mutated only through `merge_translation` / `mark_failed`, and
 * read by the encoder once translation is over.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::PipelineError;

/// Translation state of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentState {
    /// Awaiting translation
    Pending,
    /// Translation merged
    Translated,
    /// Translation gave up on this segment
    Failed,
}

impl fmt::Display for SegmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentState::Pending => write!(f, "pending"),
            SegmentState::Translated => write!(f, "translated"),
            SegmentState::Failed => write!(f, "failed"),
        }
    }
}

/// A timed text unit as returned by a speech-to-text engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSegment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Recognized text
    pub text: String,
}

impl RawSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self { start, end, text: text.into() }
    }
}

/// One transcript unit and its translation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// 0-based playback position
    pub index: usize,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Text in the source language
    pub source_text: String,
    /// Text in the target language, once translated
    pub translated_text: Option<String>,
    /// Translation state
    pub state: SegmentState,
    /// Last error message when the segment failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Segment {
    /// Create a pending segment
    pub fn new(index: usize, start: f64, end: f64, source_text: impl Into<String>) -> Self {
        Self {
            index,
            start,
            end,
            source_text: source_text.into(),
            translated_text: None,
            state: SegmentState::Pending,
            error: None,
        }
    }

    /// Build the ordered segment list of a job from raw transcriber output
    pub fn from_raw(raw: Vec<RawSegment>) -> Vec<Segment> {
        raw.into_iter()
            .enumerate()
            .map(|(index, r)| Segment::new(index, r.start, r.end, r.text))
            .collect()
    }

    pub fn is_translated(&self) -> bool {
        self.state == SegmentState::Translated
    }

    pub fn is_failed(&self) -> bool {
        self.state == SegmentState::Failed
    }
}

/// Check the ordering and non-negativity rules of a transcript.
///
/// Gaps between segments are fine and `end[i] <= start[i + 1]` is not
/// required, but starts must strictly increase.
pub fn validate(segments: &[Segment]) -> Result<(), PipelineError> {
    for (position, segment) in segments.iter().enumerate() {
        if segment.index != position {
            return Err(PipelineError::MalformedTranscript(format!(
                "segment at position {} carries index {}",
                position, segment.index
            )));
        }
        if !segment.start.is_finite() || segment.start < 0.0 {
            return Err(PipelineError::MalformedTranscript(format!(
                "segment {} has invalid start {}",
                segment.index, segment.start
            )));
        }
        if !segment.end.is_finite() || segment.end <= segment.start {
            return Err(PipelineError::MalformedTranscript(format!(
                "segment {} ends at {} which is not after its start {}",
                segment.index, segment.end, segment.start
            )));
        }
        if segment.source_text.trim().is_empty() {
            return Err(PipelineError::MalformedTranscript(format!(
                "segment {} has empty text",
                segment.index
            )));
        }
    }

    for pair in segments.windows(2) {
        if pair[0].start >= pair[1].start {
            return Err(PipelineError::MalformedTranscript(format!(
                "segment {} starts at {} which is not after segment {} at {}",
                pair[1].index, pair[1].start, pair[0].index, pair[0].start
            )));
        }
    }

    Ok(())
}

/// Record a translation. Only a `Pending` segment accepts one.
pub fn merge_translation(segment: &mut Segment, text: impl Into<String>) -> Result<(), PipelineError> {
    if segment.state != SegmentState::Pending {
        return Err(PipelineError::InvalidTransition(format!(
            "segment {} is {}, expected pending",
            segment.index, segment.state
        )));
    }
    segment.translated_text = Some(text.into());
    segment.state = SegmentState::Translated;
    segment.error = None;
    Ok(())
}

/// Give up on a segment, keeping the error that caused it.
pub fn mark_failed(segment: &mut Segment, error: impl Into<String>) -> Result<(), PipelineError> {
    if segment.state != SegmentState::Pending {
        return Err(PipelineError::InvalidTransition(format!(
            "segment {} is {}, expected pending",
            segment.index, segment.state
        )));
    }
    segment.state = SegmentState::Failed;
    segment.error = Some(error.into());
    Ok(())
}
