//! Keyword search over OCR text, window titles, app names, and URLs.

use anyhow::Result;
use rusqlite::{types::Value, Connection};

use super::captures::{hydrate_captures, CaptureRow};
use super::types::CaptureWithWindows;

/// Parameters for [`search_captures`].
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub text: String,
    /// Inclusive lower bound in Unix milliseconds.
    pub start_ms: Option<i64>,
    /// Inclusive upper bound in Unix milliseconds.
    pub end_ms: Option<i64>,
    pub limit: i64,
}

/// Whitespace-separated terms longer than one character.
pub fn query_terms(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter(|t| t.chars().count() > 1)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Captures where any window matches ANY term, newest first, without images.
pub fn search_captures(conn: &Connection, query: &SearchQuery) -> Result<Vec<CaptureWithWindows>> {
    let terms = query_terms(&query.text);
    if terms.is_empty() || query.limit <= 0 {
        return Ok(Vec::new());
    }

    let mut clauses = Vec::with_capacity(terms.len());
    let mut bindings: Vec<Value> = Vec::new();
    for term in &terms {
        clauses.push(
            "(LOWER(cw.text) LIKE ? ESCAPE '\\' OR LOWER(cw.window_name) LIKE ? ESCAPE '\\' \
             OR LOWER(cw.app_name) LIKE ? ESCAPE '\\' OR LOWER(cw.browser_url) LIKE ? ESCAPE '\\')",
        );
        let pattern = format!("%{}%", escape_like(term));
        for _ in 0..4 {
            bindings.push(Value::Text(pattern.clone()));
        }
    }

    let mut sql = format!(
        "SELECT DISTINCT c.id, c.frame_number, c.timestamp_ms, c.monitor_id \
         FROM captures c JOIN captured_windows cw ON cw.capture_id = c.id \
         WHERE ({})",
        clauses.join(" OR ")
    );
    if let Some(start) = query.start_ms {
        sql.push_str(" AND c.timestamp_ms >= ?");
        bindings.push(Value::Integer(start));
    }
    if let Some(end) = query.end_ms {
        sql.push_str(" AND c.timestamp_ms <= ?");
        bindings.push(Value::Integer(end));
    }
    sql.push_str(" ORDER BY c.timestamp_ms DESC, c.id DESC LIMIT ?");
    bindings.push(Value::Integer(query.limit));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(bindings), CaptureRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    tracing::debug!(terms = terms.len(), matched = rows.len(), "capture search");
    hydrate_captures(conn, rows, false)
}

/// Escape LIKE wildcards so user terms match literally.
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
