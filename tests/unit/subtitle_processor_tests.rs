/*!
 * Tests for subtitle encoding and parsing
 */

use anyhow::Result;

use vidscribe::segment::{merge_translation, Segment};
use vidscribe::subtitle_processor::{self, SubtitleCollection, SubtitleEntry};

use crate::common;

fn translated(index: usize, start: f64, end: f64, text: &str) -> Segment {
    let mut segment = Segment::new(index, start, end, "source");
    merge_translation(&mut segment, text).unwrap();
    segment
}

/// Encoding then parsing keeps count, order and millisecond timestamps
#[test]
fn test_encode_thenParse_shouldPreserveCountOrderAndTimestamps() -> Result<()> {
    let segments = vec![
        translated(0, 0.0, 1.2345, "Primera línea"),
        translated(1, 1.0, 4.5, "Dos líneas\nen un bloque"),
        translated(2, 59.9999, 61.001, "Cruza el minuto"),
        translated(3, 3599.5, 3725.042, "Pasada la hora"),
    ];

    let bytes = subtitle_processor::encode(&segments)?;
    let entries = SubtitleCollection::parse_srt_string(&String::from_utf8(bytes)?)?;

    assert_eq!(entries.len(), segments.len());
    for (position, (entry, segment)) in entries.iter().zip(&segments).enumerate() {
        assert_eq!(entry.seq_num, position + 1);
        assert_eq!(entry.start_time_ms, SubtitleEntry::seconds_to_ms(segment.start));
        assert_eq!(entry.end_time_ms, SubtitleEntry::seconds_to_ms(segment.end));
        assert_eq!(Some(entry.text.as_str()), segment.translated_text.as_deref());
    }
    assert_eq!(entries[3].start_time_ms, 3_599_500);
    Ok(())
}

#[test]
fn test_encode_withUnsortedInput_shouldNumberInInputOrder() -> Result<()> {
    // The encoder trusts the caller's order and never re-sorts
    let segments = vec![translated(0, 5.0, 6.0, "later"), translated(1, 1.0, 2.0, "earlier")];

    let text = String::from_utf8(subtitle_processor::encode(&segments)?)?;
    assert!(text.starts_with("1\n00:00:05,000 --> 00:00:06,000\nlater\n\n2\n00:00:01,000"));
    Ok(())
}

#[test]
fn test_saveSrt_thenLoadSrt_shouldReadBackEntries() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("out/talk.es.srt");

    let bytes = subtitle_processor::encode(&[translated(0, 0.0, 2.5, "Hola mundo")])?;
    subtitle_processor::save_srt(&path, &bytes)?;

    let loaded = SubtitleCollection::load_srt(&path)?;
    assert_eq!(loaded.entries, vec![SubtitleEntry::new(1, 0, 2_500, "Hola mundo")]);
    assert_eq!(loaded.to_srt_string().into_bytes(), bytes);
    Ok(())
}
