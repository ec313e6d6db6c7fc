//! SQLite persistence for captures, OCR output, and chat history.
//!
//! The sync query functions live in the submodules and take a
//! `&Connection`. [`Store`] wraps a shared connection and runs them on the
//! blocking pool so async callers (capture loop, HTTP handlers) never block
//! the runtime.

pub mod captures;
pub mod chat;
pub mod retention;
pub mod search;
pub mod stats;
pub mod types;

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub use search::SearchQuery;
pub use stats::StorageStats;
pub use types::{
    CaptureBatch, CaptureWithWindows, CapturedWindowRecord, ChatMessage, PruneReport,
    RetentionPolicy,
};

use crate::config::MemriConfig;

/// Anything that can durably accept capture batches.
#[async_trait]
pub trait CaptureSink: Send + Sync {
    /// Persist one batch, returning the new capture id.
    async fn persist_batch(&self, batch: CaptureBatch) -> Result<i64>;
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Shared handle to the memri database.
#[derive(Clone)]
pub struct Store {
    db: Arc<Mutex<Connection>>,
    retention: RetentionPolicy,
}

impl Store {
    pub fn new(conn: Connection, retention: RetentionPolicy) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            retention,
        }
    }

    /// Open the configured database file with the configured retention limits.
    pub fn open(config: &MemriConfig) -> Result<Self> {
        let conn = crate::db::open_database(config.resolved_db_path())?;
        Ok(Self::new(
            conn,
            RetentionPolicy::from_limits(config.storage.retention_days, config.storage.max_captures),
        ))
    }

    pub fn in_memory(retention: RetentionPolicy) -> Result<Self> {
        Ok(Self::new(crate::db::open_memory_database()?, retention))
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| anyhow::anyhow!("db task failed: {e}"))?
    }

    pub async fn fetch_recent_captures(&self, limit: i64) -> Result<Vec<CaptureWithWindows>> {
        self.with_conn(move |conn| captures::fetch_recent_captures(conn, limit)).await
    }

    pub async fn fetch_captures_metadata(&self, limit: i64) -> Result<Vec<CaptureWithWindows>> {
        self.with_conn(move |conn| captures::fetch_captures_metadata(conn, limit)).await
    }

    pub async fn fetch_images_for_captures(&self, ids: Vec<i64>) -> Result<HashMap<i64, String>> {
        self.with_conn(move |conn| captures::fetch_images_for_captures(conn, &ids)).await
    }

    pub async fn search_captures(&self, query: SearchQuery) -> Result<Vec<CaptureWithWindows>> {
        self.with_conn(move |conn| search::search_captures(conn, &query)).await
    }

    pub async fn count_captures(&self) -> Result<i64> {
        self.with_conn(|conn| captures::count_captures(conn)).await
    }

    /// Store a chat message stamped with the current time.
    pub async fn insert_chat_message(&self, role: &str, content: &str) -> Result<ChatMessage> {
        let mut message = ChatMessage {
            id: 0,
            role: role.to_string(),
            content: content.to_string(),
            created_at_ms: now_ms(),
        };
        self.with_conn(move |conn| {
            message.id = chat::insert_chat_message(
                conn,
                &message.role,
                &message.content,
                message.created_at_ms,
            )?;
            Ok(message)
        })
        .await
    }

    pub async fn fetch_chat_messages(&self, limit: i64) -> Result<Vec<ChatMessage>> {
        self.with_conn(move |conn| chat::fetch_chat_messages(conn, limit)).await
    }

    /// Run the retention policy once.
    pub async fn prune(&self) -> Result<PruneReport> {
        let policy = self.retention;
        self.with_conn(move |conn| retention::prune(conn, &policy, now_ms())).await
    }

    pub async fn stats(&self) -> Result<StorageStats> {
        self.with_conn(|conn| stats::storage_stats(conn, 10)).await
    }

    pub async fn health(&self) -> Result<crate::db::HealthReport> {
        self.with_conn(|conn| crate::db::check_health(conn)).await
    }
}

#[async_trait]
impl CaptureSink for Store {
    async fn persist_batch(&self, batch: CaptureBatch) -> Result<i64> {
        let frame = batch.frame_number;
        let windows = batch.windows.len();
        let capture_id = self
            .with_conn(move |conn| captures::insert_capture(conn, &batch))
            .await?;

        if let Err(err) = self.prune().await {
            tracing::warn!("pruning failed: {err}");
        }

        tracing::info!(frame, windows, capture_id, "persisted capture");
        Ok(capture_id)
    }
}
