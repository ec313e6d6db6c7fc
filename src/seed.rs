//! Populate an empty database from a folder of screenshots.
//!
//! Lets the API and UI be exercised on machines that cannot capture (CI,
//! headless servers).

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use tracing::info;

use crate::storage::{now_ms, CaptureBatch, CaptureSink, CapturedWindowRecord, Store};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp"];

/// Seed one single-window capture per image in `dir`. Returns how many were
/// added. A missing directory or a non-empty database seeds nothing.
pub async fn seed_captures_from_dir(store: &Store, dir: &Path) -> Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }
    if store.count_captures().await? > 0 {
        info!("database already has captures; skipping seed");
        return Ok(0);
    }

    let images = list_images(dir)?;
    for (idx, path) in images.iter().enumerate() {
        let window_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let batch = CaptureBatch {
            frame_number: idx as u64,
            timestamp_ms: modified_ms(path).unwrap_or_else(now_ms),
            monitor_id: None,
            windows: vec![CapturedWindowRecord {
                window_name,
                app_name: "static".into(),
                image_path: Some(path.to_string_lossy().into_owned()),
                ..Default::default()
            }],
        };
        store.persist_batch(batch).await?;
    }

    info!(seeded = images.len(), dir = %dir.display(), "seeded captures from static folder");
    Ok(images.len())
}

/// Image files directly inside `dir`, sorted by path.
fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read seed dir {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_image_extension(path))
        .collect();
    images.sort();
    Ok(images)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn modified_ms(path: &Path) -> Option<i64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
    i64::try_from(since_epoch.as_millis()).ok()
}
