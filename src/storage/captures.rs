//! Capture write path and timeline reads.
//!
//! [`insert_capture`] writes a capture and all of its windows in one
//! transaction. The read helpers return captures newest first with windows in
//! insertion order; only [`fetch_recent_captures`] pays for reading images.

use anyhow::Result;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use super::types::{CaptureBatch, CaptureWithWindows, CapturedWindowRecord};

/// Ids bound per `IN (...)` list, well under SQLite's variable limit.
const IN_CHUNK: usize = 500;

/// Insert a capture and its windows atomically. Returns the new capture id.
pub fn insert_capture(conn: &mut Connection, batch: &CaptureBatch) -> Result<i64> {
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO captures (frame_number, timestamp_ms, monitor_id) VALUES (?1, ?2, ?3)",
        params![batch.frame_number as i64, batch.timestamp_ms, batch.monitor_id],
    )?;
    let capture_id = tx.last_insert_rowid();

    {
        let mut stmt = tx.prepare(
            "INSERT INTO captured_windows (\
                capture_id, window_name, app_name, text, confidence, ocr_json, image_base64, image_path, browser_url\
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for window in &batch.windows {
            stmt.execute(params![
                capture_id,
                window.window_name,
                window.app_name,
                window.text,
                window.confidence,
                window.ocr_json,
                window.image_base64,
                window.image_path,
                window.browser_url,
            ])?;
        }
    }

    tx.commit()?;
    Ok(capture_id)
}

/// Newest captures with windows, loading images from disk when no inline
/// base64 was stored.
pub fn fetch_recent_captures(conn: &Connection, limit: i64) -> Result<Vec<CaptureWithWindows>> {
    let rows = fetch_capture_rows(conn, limit)?;
    hydrate_captures(conn, rows, true)
}

/// Newest captures with windows but without image payloads.
pub fn fetch_captures_metadata(conn: &Connection, limit: i64) -> Result<Vec<CaptureWithWindows>> {
    let rows = fetch_capture_rows(conn, limit)?;
    hydrate_captures(conn, rows, false)
}

/// Base64 PNG for each requested capture (first readable window image).
pub fn fetch_images_for_captures(conn: &Connection, ids: &[i64]) -> Result<HashMap<i64, String>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut rows = Vec::new();
    for chunk in ids.chunks(IN_CHUNK) {
        let sql = format!(
            "SELECT capture_id, image_base64, image_path FROM captured_windows \
             WHERE capture_id IN ({}) ORDER BY capture_id, id",
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let chunk_rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;
        for row in chunk_rows {
            rows.push(row?);
        }
    }

    let mut images = HashMap::new();
    for (capture_id, inline, path) in rows {
        if images.contains_key(&capture_id) {
            continue;
        }
        let encoded = inline.or_else(|| path.as_deref().and_then(load_image_as_base64));
        if let Some(encoded) = encoded {
            images.insert(capture_id, encoded);
        }
    }

    Ok(images)
}

pub fn count_captures(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM captures", [], |row| row.get(0))?)
}

/// Read an image file and encode it as base64. `None` when unreadable.
pub fn load_image_as_base64(path: &str) -> Option<String> {
    match std::fs::read(Path::new(path)) {
        Ok(bytes) => Some(BASE64.encode(bytes)),
        Err(err) => {
            tracing::debug!(path, "image not readable: {err}");
            None
        }
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────────

pub(crate) struct CaptureRow {
    pub id: i64,
    pub frame_number: i64,
    pub timestamp_ms: i64,
    pub monitor_id: Option<u32>,
}

impl CaptureRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            frame_number: row.get(1)?,
            timestamp_ms: row.get(2)?,
            monitor_id: row.get(3)?,
        })
    }
}

fn fetch_capture_rows(conn: &Connection, limit: i64) -> Result<Vec<CaptureRow>> {
    let limit = limit.max(0);
    if limit == 0 {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        "SELECT id, frame_number, timestamp_ms, monitor_id FROM captures \
         ORDER BY timestamp_ms DESC, id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit], CaptureRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Attach windows to capture rows, preserving the order of `rows`.
pub(crate) fn hydrate_captures(
    conn: &Connection,
    rows: Vec<CaptureRow>,
    with_images: bool,
) -> Result<Vec<CaptureWithWindows>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let mut windows = fetch_windows_for_ids(conn, &ids, with_images)?;

    Ok(rows
        .into_iter()
        .map(|row| CaptureWithWindows {
            capture_id: row.id,
            frame_number: row.frame_number,
            timestamp_ms: row.timestamp_ms,
            monitor_id: row.monitor_id,
            windows: windows.remove(&row.id).unwrap_or_default(),
        })
        .collect())
}

fn fetch_windows_for_ids(
    conn: &Connection,
    ids: &[i64],
    with_images: bool,
) -> Result<BTreeMap<i64, Vec<CapturedWindowRecord>>> {
    // Skip the inline column entirely for metadata reads
    let image_column = if with_images { "image_base64" } else { "NULL" };

    let mut rows = Vec::new();
    for chunk in ids.chunks(IN_CHUNK) {
        let sql = format!(
            "SELECT capture_id, window_name, app_name, text, confidence, ocr_json, {image_column}, image_path, browser_url \
             FROM captured_windows WHERE capture_id IN ({}) ORDER BY capture_id, id",
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let chunk_rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                CapturedWindowRecord {
                    window_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    app_name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    text: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    confidence: row.get(4)?,
                    ocr_json: row.get(5)?,
                    image_base64: row.get(6)?,
                    image_path: row.get(7)?,
                    browser_url: row.get(8)?,
                },
            ))
        })?;
        for row in chunk_rows {
            rows.push(row?);
        }
    }

    let mut by_capture: BTreeMap<i64, Vec<CapturedWindowRecord>> = BTreeMap::new();
    for (capture_id, mut window) in rows {
        if with_images && window.image_base64.is_none() {
            window.image_base64 = window.image_path.as_deref().and_then(load_image_as_base64);
        }
        by_capture.entry(capture_id).or_default().push(window);
    }
    Ok(by_capture)
}

/// `?, ?, ?` for an IN list of `n` items.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;

    fn window(name: &str, text: &str) -> CapturedWindowRecord {
        CapturedWindowRecord {
            window_name: name.into(),
            app_name: "Editor".into(),
            text: text.into(),
            ..Default::default()
        }
    }

    #[test]
    fn insert_and_read_back_in_order() {
        let mut conn = open_memory_database().unwrap();
        for (frame, ts) in [(0u64, 1_000i64), (1, 3_000), (2, 2_000)] {
            insert_capture(
                &mut conn,
                &CaptureBatch {
                    frame_number: frame,
                    timestamp_ms: ts,
                    monitor_id: Some(1),
                    windows: vec![window("a", "first"), window("b", "second")],
                },
            )
            .unwrap();
        }

        let captures = fetch_captures_metadata(&conn, 10).unwrap();
        let stamps: Vec<i64> = captures.iter().map(|c| c.timestamp_ms).collect();
        assert_eq!(stamps, vec![3_000, 2_000, 1_000]);
        assert_eq!(captures[0].windows.len(), 2);
        assert_eq!(captures[0].windows[0].window_name, "a");
        assert_eq!(captures[0].monitor_id, Some(1));
    }

    #[test]
    fn non_positive_limit_returns_nothing() {
        let mut conn = open_memory_database().unwrap();
        insert_capture(
            &mut conn,
            &CaptureBatch { frame_number: 0, timestamp_ms: 1, monitor_id: None, windows: vec![] },
        )
        .unwrap();
        assert!(fetch_captures_metadata(&conn, 0).unwrap().is_empty());
        assert!(fetch_recent_captures(&conn, -5).unwrap().is_empty());
    }

    #[test]
    fn metadata_omits_inline_images() {
        let mut conn = open_memory_database().unwrap();
        let mut w = window("a", "x");
        w.image_base64 = Some("aGVsbG8=".into());
        insert_capture(
            &mut conn,
            &CaptureBatch { frame_number: 0, timestamp_ms: 1, monitor_id: None, windows: vec![w] },
        )
        .unwrap();

        let meta = fetch_captures_metadata(&conn, 1).unwrap();
        assert!(meta[0].windows[0].image_base64.is_none());
        let full = fetch_recent_captures(&conn, 1).unwrap();
        assert_eq!(full[0].windows[0].image_base64.as_deref(), Some("aGVsbG8="));
    }

    #[test]
    fn images_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        std::fs::write(&path, b"hello").unwrap();

        let mut conn = open_memory_database().unwrap();
        let mut w = window("a", "x");
        w.image_path = Some(path.to_string_lossy().into_owned());
        let id = insert_capture(
            &mut conn,
            &CaptureBatch { frame_number: 0, timestamp_ms: 1, monitor_id: None, windows: vec![w] },
        )
        .unwrap();

        let images = fetch_images_for_captures(&conn, &[id, 999]).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[&id], BASE64.encode(b"hello"));

        let full = fetch_recent_captures(&conn, 1).unwrap();
        assert_eq!(full[0].windows[0].image_base64.as_deref(), Some(images[&id].as_str()));
    }

    #[test]
    fn missing_image_file_is_none() {
        assert!(load_image_as_base64("/definitely/not/here.png").is_none());
    }
}
