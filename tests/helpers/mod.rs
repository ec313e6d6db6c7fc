#![allow(dead_code)]

use memri::db;
use memri::storage::captures::insert_capture;
use memri::storage::{CaptureBatch, CapturedWindowRecord, RetentionPolicy, Store};
use rusqlite::Connection;

pub const HOUR_MS: i64 = 3_600_000;
pub const DAY_MS: i64 = 24 * HOUR_MS;
/// 2024-03-10T12:00:00Z
pub const NOON: i64 = 1_710_072_000_000;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

pub fn test_store() -> Store {
    Store::in_memory(RetentionPolicy::default()).unwrap()
}

pub fn window(app: &str, title: &str, text: &str) -> CapturedWindowRecord {
    CapturedWindowRecord {
        window_name: title.to_string(),
        app_name: app.to_string(),
        text: text.to_string(),
        confidence: Some(0.9),
        ..Default::default()
    }
}

pub fn batch(frame_number: u64, timestamp_ms: i64, windows: Vec<CapturedWindowRecord>) -> CaptureBatch {
    CaptureBatch {
        frame_number,
        timestamp_ms,
        monitor_id: Some(0),
        windows,
    }
}

/// Insert a single-window capture and return its id.
pub fn insert_text(conn: &mut Connection, timestamp_ms: i64, app: &str, text: &str) -> i64 {
    insert_capture(conn, &batch(0, timestamp_ms, vec![window(app, app, text)])).unwrap()
}

/// Minimal valid PNG bytes for a 2x2 image.
pub fn png_bytes() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 255]));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}
