//! Streams assistant deltas to the client while saving the full reply.
//!
//! The relay task owns the upstream body. It keeps reading after the client
//! goes away, so the reply is stored once the upstream ends regardless of
//! who was listening.

use std::fmt::Display;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::sse::{delta_text, stream_error, SseDecoder};
use crate::events::{EventBus, ServerEvent};
use crate::storage::Store;

const RELAY_BUFFER: usize = 32;

/// Spawn the relay. Returns the delta receiver for the HTTP response and a
/// handle resolving to the stored assistant message id, if any text arrived.
pub fn spawn_relay<S, B, E>(
    upstream: S,
    store: Store,
    events: EventBus,
) -> (mpsc::Receiver<String>, JoinHandle<Option<i64>>)
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let (tx, rx) = mpsc::channel(RELAY_BUFFER);
    let handle = tokio::spawn(relay(upstream, tx, store, events));
    (rx, handle)
}

async fn relay<S, B, E>(
    mut upstream: S,
    tx: mpsc::Sender<String>,
    store: Store,
    events: EventBus,
) -> Option<i64>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut decoder = SseDecoder::new();
    let mut reply = String::new();
    let mut client_open = true;

    loop {
        let payloads = match upstream.next().await {
            Some(Ok(chunk)) => decoder.push(chunk.as_ref()),
            Some(Err(err)) => {
                error!("anthropic stream error: {err}");
                break;
            }
            None => break,
        };
        for payload in payloads {
            forward(&payload, &mut reply, &tx, &mut client_open).await;
        }
    }
    for payload in decoder.finish() {
        forward(&payload, &mut reply, &tx, &mut client_open).await;
    }
    drop(tx);

    if reply.is_empty() {
        debug!("assistant stream ended without text");
        return None;
    }

    info!(chars = reply.len(), client_open, "saving streamed assistant reply");
    match store.insert_chat_message("assistant", &reply).await {
        Ok(message) => {
            events.publish(ServerEvent::chat("assistant", reply));
            Some(message.id)
        }
        Err(err) => {
            error!("failed to save assistant message: {err:#}");
            None
        }
    }
}

async fn forward(
    payload: &str,
    reply: &mut String,
    tx: &mpsc::Sender<String>,
    client_open: &mut bool,
) {
    if let Some(message) = stream_error(payload) {
        warn!("anthropic stream reported an error: {message}");
        return;
    }
    let Some(text) = delta_text(payload) else {
        return;
    };
    reply.push_str(&text);
    if *client_open && tx.send(text).await.is_err() {
        debug!("client disconnected, continuing to drain upstream");
        *client_open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RetentionPolicy;
    use futures::stream;

    fn delta(text: &str) -> String {
        format!(
            "event: content_block_delta\ndata: {{\"type\":\"content_block_delta\",\"index\":0,\"delta\":{{\"type\":\"text_delta\",\"text\":\"{text}\"}}}}\n\n"
        )
    }

    fn chunks(body: &str, size: usize) -> Vec<Result<Vec<u8>, String>> {
        body.as_bytes().chunks(size).map(|c| Ok(c.to_vec())).collect()
    }

    #[tokio::test]
    async fn relays_deltas_and_saves_reply() {
        let store = Store::in_memory(RetentionPolicy::default()).unwrap();
        let events = EventBus::new();
        let mut chat_events = events.subscribe();

        let body = format!(
            "event: message_start\ndata: {{\"type\":\"message_start\"}}\n\n{}{}event: message_stop\ndata: {{\"type\":\"message_stop\"}}\n\n",
            delta("You were in "),
            delta("Figma [[CLIP:3]]")
        );
        let (mut rx, handle) = spawn_relay(stream::iter(chunks(&body, 7)), store.clone(), events);

        let mut received = Vec::new();
        while let Some(text) = rx.recv().await {
            received.push(text);
        }
        assert_eq!(received, vec!["You were in ".to_string(), "Figma [[CLIP:3]]".to_string()]);

        let id = handle.await.unwrap().unwrap();
        let saved = store.fetch_chat_messages(1).await.unwrap();
        assert_eq!(saved[0].id, id);
        assert_eq!(saved[0].role, "assistant");
        assert_eq!(saved[0].content, "You were in Figma [[CLIP:3]]");
        assert_eq!(
            chat_events.recv().await.unwrap(),
            ServerEvent::chat("assistant", "You were in Figma [[CLIP:3]]")
        );
    }

    #[tokio::test]
    async fn saves_reply_after_client_disconnects() {
        let store = Store::in_memory(RetentionPolicy::default()).unwrap();
        let body = format!("{}{}", delta("partial "), delta("answer"));
        let (rx, handle) = spawn_relay(stream::iter(chunks(&body, 16)), store.clone(), EventBus::new());
        drop(rx);

        assert!(handle.await.unwrap().is_some());
        let saved = store.fetch_chat_messages(10).await.unwrap();
        assert_eq!(saved[0].content, "partial answer");
    }

    #[tokio::test]
    async fn upstream_error_keeps_received_text() {
        let store = Store::in_memory(RetentionPolicy::default()).unwrap();
        let mut items = chunks(&delta("half"), 1024);
        items.push(Err("connection reset".to_string()));
        let (_rx, handle) = spawn_relay(stream::iter(items), store.clone(), EventBus::new());

        assert!(handle.await.unwrap().is_some());
        assert_eq!(store.fetch_chat_messages(1).await.unwrap()[0].content, "half");
    }

    #[tokio::test]
    async fn nothing_saved_without_text() {
        let store = Store::in_memory(RetentionPolicy::default()).unwrap();
        let body = "data: {\"type\":\"ping\"}\n\n".to_string();
        let (_rx, handle) = spawn_relay(stream::iter(chunks(&body, 4)), store.clone(), EventBus::new());

        assert_eq!(handle.await.unwrap(), None);
        assert!(store.fetch_chat_messages(10).await.unwrap().is_empty());
    }
}
