//! Turning a chat question into capture context for the model.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use crate::storage::CaptureWithWindows;

const PREVIEW_CHARS: usize = 200;

const STOP_WORDS: &[&str] = &[
    "what", "did", "i", "do", "on", "the", "was", "were", "last", "past", "yesterday", "today",
    "morning", "hour", "week", "show", "me", "find", "search", "look", "for", "my", "a", "an",
    "in", "have", "has", "been", "any", "some", "which", "where", "when", "how", "why", "can",
    "could", "would", "should", "will", "that", "this", "these", "those", "with", "from",
    "about", "into", "through", "during", "before", "after", "above", "below", "between",
    "under", "again", "further", "then", "once", "here", "there", "all", "each", "few", "more",
    "most", "other", "such", "only", "own", "same", "than", "too", "very", "just", "also",
    "now", "work", "done", "watched", "looked", "used", "opened", "saw", "see", "videos",
    "video", "page", "pages", "site", "sites", "app", "apps",
];

/// Inclusive millisecond bounds for a capture search. `None` is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start_ms: Option<i64>,
    pub end_ms: Option<i64>,
}

/// Read a time window out of phrases like "yesterday" or "this morning".
///
/// Day boundaries follow the calendar of `now`'s time zone.
pub fn parse_time_range<Tz: TimeZone>(query: &str, now: &DateTime<Tz>) -> TimeRange {
    let query = query.to_lowercase();
    let tz = now.timezone();
    let today = now.date_naive();
    let at = |date: NaiveDate, hour: u32| local_ms(&tz, date, hour);
    let now_ms = now.timestamp_millis();

    if query.contains("yesterday") {
        let yesterday = today.pred_opt().unwrap_or(today);
        TimeRange {
            start_ms: at(yesterday, 0),
            end_ms: at(today, 0),
        }
    } else if query.contains("today") {
        TimeRange {
            start_ms: at(today, 0),
            end_ms: None,
        }
    } else if query.contains("last hour") || query.contains("past hour") {
        TimeRange {
            start_ms: Some(now_ms - Duration::hours(1).num_milliseconds()),
            end_ms: None,
        }
    } else if query.contains("this morning") {
        TimeRange {
            start_ms: at(today, 6),
            end_ms: at(today, 12),
        }
    } else if query.contains("last week") || query.contains("past week") {
        TimeRange {
            start_ms: Some(now_ms - Duration::days(7).num_milliseconds()),
            end_ms: None,
        }
    } else {
        TimeRange::default()
    }
}

fn local_ms<Tz: TimeZone>(tz: &Tz, date: NaiveDate, hour: u32) -> Option<i64> {
    let naive = date.and_hms_opt(hour, 0, 0)?;
    let local = tz
        .from_local_datetime(&naive)
        .earliest()
        // skipped by a DST jump
        .unwrap_or_else(|| tz.from_utc_datetime(&naive));
    Some(local.timestamp_millis())
}

/// Pick the words of a question worth searching for, space separated.
///
/// Double-quoted phrases come first, then every remaining word longer than
/// two characters that is not a stop word.
pub fn extract_search_terms(query: &str) -> String {
    let mut terms: Vec<String> = query
        .split('"')
        .skip(1)
        .step_by(2)
        .map(str::trim)
        .filter(|phrase| !phrase.is_empty())
        .map(str::to_lowercase)
        .collect();

    let lowered = query.to_lowercase();
    let words: Vec<&str> = lowered
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .collect();

    for word in &words {
        let already = terms
            .iter()
            .any(|t| t.split_whitespace().any(|part| part == *word));
        if word.chars().count() > 2 && !STOP_WORDS.contains(word) && !already {
            terms.push(word.to_string());
        }
    }

    if terms.is_empty() {
        if let Some(word) = words.iter().find(|w| w.chars().count() >= 3) {
            terms.push(word.to_string());
        }
    }
    terms.join(" ")
}

/// Wrap `query` with capture excerpts tagged by `[[CLIP:<id>]]` markers.
pub fn build_context_prompt(query: &str, captures: &[CaptureWithWindows]) -> String {
    let mut blocks = Vec::new();
    for capture in captures {
        let at = Utc
            .timestamp_millis_opt(capture.timestamp_ms)
            .single()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| capture.timestamp_ms.to_string());

        for window in &capture.windows {
            blocks.push(format!(
                "[[CLIP:{}]] At {at}, App: {}, Window: \"{}\"\nContent: {}",
                capture.capture_id,
                window.app_name,
                window.window_name,
                preview(&window.text)
            ));
        }
    }

    if blocks.is_empty() {
        return query.to_string();
    }

    format!(
        "You are a helpful assistant with access to the user's screen captures. \
These are the captures relevant to the question:\n\n{}\n\n\
Whenever you use information from a capture, cite it inline with its exact marker, \
e.g. [[CLIP:ID]] with ID replaced by the capture number. The user interface turns each \
marker into a link to the capture.\n\nQuestion:\n\n{query}",
        blocks.join("\n\n")
    )
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
