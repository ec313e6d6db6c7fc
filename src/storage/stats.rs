use anyhow::Result;
use rusqlite::{params, Connection};
use serde::Serialize;

/// Storage-wide counters for the `/stats` endpoint and `memri stats`.
#[derive(Debug, Serialize)]
pub struct StorageStats {
    pub total_captures: u64,
    pub total_windows: u64,
    pub total_chat_messages: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_capture_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_capture_ms: Option<i64>,
    pub top_apps: Vec<AppCount>,
}

#[derive(Debug, Serialize)]
pub struct AppCount {
    pub app_name: String,
    pub windows: u64,
}

pub fn storage_stats(conn: &Connection, top_n: usize) -> Result<StorageStats> {
    let count = |sql: &str| -> Result<u64> {
        let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n as u64)
    };

    let (oldest, newest): (Option<i64>, Option<i64>) = conn.query_row(
        "SELECT MIN(timestamp_ms), MAX(timestamp_ms) FROM captures",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let mut stmt = conn.prepare(
        "SELECT app_name, COUNT(*) AS n FROM captured_windows \
         WHERE app_name IS NOT NULL AND app_name != '' \
         GROUP BY app_name ORDER BY n DESC, app_name ASC LIMIT ?1",
    )?;
    let top_apps = stmt
        .query_map(params![top_n as i64], |row| {
            Ok(AppCount {
                app_name: row.get(0)?,
                windows: row.get::<_, i64>(1)? as u64,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(StorageStats {
        total_captures: count("SELECT COUNT(*) FROM captures")?,
        total_windows: count("SELECT COUNT(*) FROM captured_windows")?,
        total_chat_messages: count("SELECT COUNT(*) FROM chat_messages")?,
        oldest_capture_ms: oldest,
        newest_capture_ms: newest,
        top_apps,
    })
}
