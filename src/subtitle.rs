use regex::Regex;
use std::sync::LazyLock;

use crate::models::CaptionEntry;

const COMMA_PAUSE: f64 = 0.2;
const SENTENCE_END_PAUSE: f64 = 0.4;
const ALPHA: f64 = 0.75;
/// Shortest time a caption stays on screen.
pub const MIN_CAPTION_SECONDS: f64 = 0.3;

static ELEMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\w[\w'-]*)|([,.!?])").unwrap());

/// Estimated pause time and spoken-word weight of one caption line.
fn line_weight(text: &str) -> (f64, f64) {
    let mut pause = 0.0;
    let mut weight = 0.0;
    for m in ELEMENT.find_iter(text) {
        match m.as_str() {
            "," => pause += COMMA_PAUSE,
            "." | "!" | "?" => pause += SENTENCE_END_PAUSE,
            word => weight += (word.chars().count() as f64).powf(ALPHA),
        }
    }
    (pause, weight)
}

/// Spread `total_seconds` over the caption lines, back to back from zero.
///
/// Each line gets its punctuation pauses plus a share of the remaining time
/// proportional to its word weight. Empty lines are dropped.
pub fn time_captions(lines: &[String], total_seconds: f64) -> Vec<CaptionEntry> {
    let lines: Vec<&str> = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let weights: Vec<(f64, f64)> = lines.iter().map(|l| line_weight(l)).collect();
    let total_pause: f64 = weights.iter().map(|(p, _)| p).sum();
    let total_weight: f64 = weights.iter().map(|(_, w)| w).sum();
    let word_time_available = (total_seconds - total_pause).max(0.0);

    let count = lines.len();
    let mut entries = Vec::with_capacity(count);
    let mut cursor = 0.0_f64;
    for (text, (pause, weight)) in lines.into_iter().zip(weights) {
        let share = if total_weight > 0.0 {
            word_time_available * weight / total_weight
        } else {
            word_time_available / count as f64
        };
        let duration = (share + pause).max(MIN_CAPTION_SECONDS);
        entries.push(CaptionEntry {
            text: text.to_string(),
            start: cursor,
            end: cursor + duration,
        });
        cursor += duration;
    }
    entries
}

/// Provisional timing: a fixed number of seconds per line.
pub fn uniform_captions(lines: &[String], seconds_per_line: f64) -> Vec<CaptionEntry> {
    let count = lines.iter().filter(|l| !l.trim().is_empty()).count();
    time_captions(lines, seconds_per_line.max(MIN_CAPTION_SECONDS) * count as f64)
}

/// Re-time existing captions across a new total duration, keeping their text.
pub fn retime_captions(entries: &[CaptionEntry], total_seconds: f64) -> Vec<CaptionEntry> {
    let lines: Vec<String> = entries.iter().map(|e| e.text.clone()).collect();
    time_captions(&lines, total_seconds)
}

/// End time of the last caption.
pub fn captions_end(entries: &[CaptionEntry]) -> f64 {
    entries.iter().map(|e| e.end).fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_captions_fill_total_duration() {
        let entries = time_captions(&lines(&["I'm a cat,", "of course I knock things over."]), 6.0);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].start, 0.0);
        assert!((entries[0].end - entries[1].start).abs() < 1e-9);
        assert!((captions_end(&entries) - 6.0).abs() < 1e-9);
        for e in &entries {
            assert!(e.end > e.start);
        }
    }

    #[test]
    fn test_longer_lines_get_more_time() {
        let entries = time_captions(&lines(&["hi", "this line has many more words in it"]), 10.0);
        let d0 = entries[0].end - entries[0].start;
        let d1 = entries[1].end - entries[1].start;
        assert!(d1 > d0);
    }

    #[test]
    fn test_zero_duration_keeps_minimum() {
        let entries = time_captions(&lines(&["a", "b"]), 0.0);
        for e in &entries {
            assert!(e.end - e.start >= MIN_CAPTION_SECONDS - 1e-9);
        }
    }

    #[test]
    fn test_empty_lines_dropped() {
        assert!(time_captions(&lines(&["", "  "]), 5.0).is_empty());
        let entries = uniform_captions(&lines(&["one", "", "two"]), 2.0);
        assert_eq!(entries.len(), 2);
        assert!((captions_end(&entries) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_retime_keeps_text() {
        let entries = uniform_captions(&lines(&["one", "two"]), 2.0);
        let retimed = retime_captions(&entries, 9.0);
        assert_eq!(retimed[1].text, "two");
        assert!((captions_end(&retimed) - 9.0).abs() < 1e-9);
    }
}
