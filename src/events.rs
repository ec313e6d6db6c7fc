//! Live notifications pushed to `/events` subscribers.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::storage::{CaptureBatch, CaptureSink, CapturedWindowRecord};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Capture {
        frame_number: u64,
        timestamp_ms: i64,
        windows: Vec<CapturedWindowRecord>,
        monitor_id: Option<u32>,
    },
    Chat {
        role: String,
        content: String,
    },
}

impl ServerEvent {
    pub fn chat(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Chat {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Capture { .. } => "capture",
            Self::Chat { .. } => "chat",
        }
    }
}

/// Fan-out channel for [`ServerEvent`]s. Cloning shares the channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ServerEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Publish to current subscribers. Nobody listening is not an error.
    pub fn publish(&self, event: ServerEvent) {
        let kind = event.kind();
        match self.tx.send(event) {
            Ok(receivers) => trace!(kind, receivers, "event published"),
            Err(_) => trace!(kind, "event dropped, no subscribers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Sink that announces every persisted capture on the bus.
pub struct NotifyingSink {
    inner: Arc<dyn CaptureSink>,
    events: EventBus,
}

impl NotifyingSink {
    pub fn new(inner: Arc<dyn CaptureSink>, events: EventBus) -> Self {
        Self { inner, events }
    }
}

#[async_trait]
impl CaptureSink for NotifyingSink {
    async fn persist_batch(&self, batch: CaptureBatch) -> Result<i64> {
        let event = ServerEvent::Capture {
            frame_number: batch.frame_number,
            timestamp_ms: batch.timestamp_ms,
            windows: batch.windows.clone(),
            monitor_id: batch.monitor_id,
        };
        let id = self.inner.persist_batch(batch).await?;
        self.events.publish(event);
        Ok(id)
    }
}
