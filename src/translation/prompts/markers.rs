/*!
 * Numbered markers for batched translation.
 *
 * A batched prompt lists each segment behind `<<SEGMENT_n>>`, where `n` is
 * the segment index, and closes with `<<END>>`. The reply must carry the
 * same markers so every translation can be matched back to its segment.
 */

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Terminator line of a batch
pub const END_MARKER: &str = "<<END>>";

static SEGMENT_MARKER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*<<SEGMENT_(\d+)>>\s*(.*)$").expect("marker regex is valid"));

/// Marker announcing the segment with this index
pub fn segment_marker(index: usize) -> String {
    format!("<<SEGMENT_{}>>", index)
}

/// Split marked text into `(index, text)` sections, in order of appearance.
///
/// Text before the first marker is ignored and parsing stops at the end
/// marker. Text on the marker line itself belongs to that section.
pub fn parse_marked_sections(text: &str) -> Vec<(usize, String)> {
    let mut sections: Vec<(usize, Vec<&str>)> = Vec::new();

    for line in text.lines() {
        if let Some(end) = line.find(END_MARKER) {
            if let Some((_, lines)) = sections.last_mut() {
                let before = line[..end].trim();
                if !before.is_empty() {
                    lines.push(before);
                }
            }
            break;
        }

        if let Some(caps) = SEGMENT_MARKER_REGEX.captures(line) {
            let Ok(index) = caps[1].parse::<usize>() else {
                continue;
            };
            let rest = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
            let mut lines = Vec::new();
            if !rest.is_empty() {
                lines.push(rest);
            }
            sections.push((index, lines));
            continue;
        }

        if let Some((_, lines)) = sections.last_mut() {
            lines.push(line.trim_end());
        }
    }

    sections
        .into_iter()
        .map(|(index, lines)| (index, lines.join("\n").trim().to_string()))
        .collect()
}

/// Match a batched reply against the indexes that were sent.
///
/// Succeeds only when the reply has exactly one non-empty section per
/// expected index and nothing else; the result follows `expected` order.
pub fn parse_batch_response(response: &str, expected: &[usize]) -> Result<Vec<String>, String> {
    let sections = parse_marked_sections(response);
    if sections.len() != expected.len() {
        return Err(format!(
            "expected {} marked translations, found {}",
            expected.len(),
            sections.len()
        ));
    }

    let mut by_index: HashMap<usize, String> = HashMap::with_capacity(sections.len());
    for (index, text) in sections {
        if by_index.insert(index, text).is_some() {
            return Err(format!("marker {} appears more than once", index));
        }
    }

    expected
        .iter()
        .map(|index| match by_index.remove(index) {
            Some(text) if !text.is_empty() => Ok(text),
            Some(_) => Err(format!("translation for marker {} is empty", index)),
            None => Err(format!("marker {} is missing", index)),
        })
        .collect()
}
