use std::{collections::BTreeSet, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::SegmentMergeConfig;

/// Transcript entry as delivered by the host page. Numbers may arrive as
/// strings, be missing, negative or non-finite.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSegment {
    #[serde(default)]
    pub start: Value,
    #[serde(default)]
    pub end: Value,
    #[serde(default)]
    pub text: Option<String>,
}

impl RawSegment {
    pub fn new(start: f64, end: f64, text: &str) -> Self {
        Self {
            start: Value::from(start),
            end: Value::from(end),
            text: Some(text.to_string()),
        }
    }
}

/// A normalized, immutable span of transcript text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptSegment {
    pub start: Duration,
    pub end: Duration,
    pub text: String,
}

/// Seconds from a loosely-typed JSON value; anything unusable becomes 0.
fn seconds(value: &Value) -> f64 {
    let secs = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if secs.is_finite() && secs > 0.0 {
        secs
    } else {
        0.0
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

struct Span {
    start: f64,
    end: f64,
    text: String,
}

/// Clamps, filters, sorts and merges raw transcript entries.
///
/// Entries with empty text or no positive length are dropped. A segment that
/// starts less than `max_gap` after the previous one ends is folded into it
/// when the combined span stays under `max_span`.
pub fn normalize_segments(raw: &[RawSegment], config: &SegmentMergeConfig) -> Vec<TranscriptSegment> {
    let mut spans: Vec<Span> = raw
        .iter()
        .map(|segment| Span {
            start: seconds(&segment.start),
            end: seconds(&segment.end),
            text: segment.text.as_deref().unwrap_or_default().trim().to_string(),
        })
        .filter(|span| !span.text.is_empty() && span.end > span.start)
        .collect();

    spans.sort_by(|a, b| a.start.total_cmp(&b.start));

    let max_gap = config.max_gap.as_secs_f64();
    let max_span = config.max_span.as_secs_f64();

    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        if let Some(last) = merged.last_mut() {
            if span.start - last.end < max_gap && span.end - last.start < max_span {
                last.end = last.end.max(span.end);
                last.text = collapse_whitespace(&format!("{} {}", last.text, span.text));
                continue;
            }
        }
        merged.push(span);
    }

    merged
        .into_iter()
        .map(|span| TranscriptSegment {
            start: Duration::from_secs_f64(span.start),
            end: Duration::from_secs_f64(span.end),
            text: span.text,
        })
        .collect()
}

/// Indices of not-yet-admitted segments whose start is at or before
/// `now + tolerance`, in start order.
pub fn due_segments(
    segments: &[TranscriptSegment],
    admitted: &BTreeSet<usize>,
    now: Duration,
    tolerance: Duration,
) -> Vec<usize> {
    let horizon = now + tolerance;
    segments
        .iter()
        .enumerate()
        .take_while(|(_, segment)| segment.start <= horizon)
        .filter(|(index, _)| !admitted.contains(index))
        .map(|(index, _)| index)
        .collect()
}

/// Indices of segments not yet due but starting within `window` of `now`.
pub fn lookahead_segments(
    segments: &[TranscriptSegment],
    admitted: &BTreeSet<usize>,
    now: Duration,
    tolerance: Duration,
    window: Duration,
) -> Vec<usize> {
    let due_horizon = now + tolerance;
    let lead_end = now + window;
    segments
        .iter()
        .enumerate()
        .skip_while(|(_, segment)| segment.start <= due_horizon)
        .take_while(|(_, segment)| segment.start <= lead_end)
        .filter(|(index, _)| !admitted.contains(index))
        .map(|(index, _)| index)
        .collect()
}
