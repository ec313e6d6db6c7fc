use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::AppState;

/// Forward bus events to one client as JSON `data` frames.
pub async fn events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.events.subscribe();
    debug!(subscribers = state.events.subscriber_count(), "event stream opened");

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => match Event::default().json_data(&event) {
                    Ok(frame) => yield Ok(frame),
                    Err(err) => warn!("failed to encode {} event: {err}", event.kind()),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged, dropping events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
