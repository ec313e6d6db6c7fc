//! Record types shared by the capture pipeline, storage, and the HTTP API.

use serde::{Deserialize, Serialize};

/// One screen grab ready to be persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureBatch {
    /// Per-monitor counter, incremented only for persisted frames.
    pub frame_number: u64,
    /// Wall-clock capture time in Unix milliseconds.
    pub timestamp_ms: i64,
    /// Monitor that produced the frame. `None` for seeded captures.
    pub monitor_id: Option<u32>,
    pub windows: Vec<CapturedWindowRecord>,
}

/// OCR output and image reference for one window of a capture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapturedWindowRecord {
    pub window_name: String,
    pub app_name: String,
    pub text: String,
    pub confidence: Option<f32>,
    /// Engine-specific word boxes as JSON.
    pub ocr_json: Option<String>,
    pub image_base64: Option<String>,
    pub image_path: Option<String>,
    pub browser_url: Option<String>,
}

/// Capture with its windows inlined, as served by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureWithWindows {
    pub capture_id: i64,
    pub frame_number: i64,
    pub timestamp_ms: i64,
    pub monitor_id: Option<u32>,
    pub windows: Vec<CapturedWindowRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: i64,
    pub role: String,
    pub content: String,
    pub created_at_ms: i64,
}

/// Limits enforced after every persisted capture. `None` disables a limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetentionPolicy {
    pub retention_days: Option<u64>,
    pub max_captures: Option<u64>,
}

impl RetentionPolicy {
    /// Build from raw config values where `0` means "off".
    pub fn from_limits(retention_days: u64, max_captures: u64) -> Self {
        Self {
            retention_days: (retention_days > 0).then_some(retention_days),
            max_captures: (max_captures > 0).then_some(max_captures),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.retention_days.is_some() || self.max_captures.is_some()
    }
}

/// Outcome of a retention pass.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct PruneReport {
    /// Captures removed for exceeding `retention_days`.
    pub expired: usize,
    /// Captures removed to get back under `max_captures`.
    pub trimmed: usize,
    /// Window images deleted from disk.
    pub files_removed: usize,
}
