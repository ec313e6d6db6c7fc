pub mod maintenance;
pub mod monitors;
pub mod search;
pub mod serve;
pub mod stats;

use chrono::{Local, TimeZone};

/// Unix milliseconds as local `YYYY-MM-DD HH:MM:SS`.
pub(crate) fn format_ts(ms: i64) -> String {
    Local
        .timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}
