use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use chrono::Local;
use futures::Stream;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use super::AppState;
use crate::assistant::{
    build_context_prompt, extract_search_terms, parse_time_range, spawn_relay, AnthropicClient,
};
use crate::error::{ApiError, ApiResult};
use crate::events::ServerEvent;
use crate::storage::{ChatMessage, SearchQuery};

#[derive(Debug, Deserialize)]
pub struct AssistantInput {
    prompt: String,
    max_tokens: Option<u32>,
    model: Option<String>,
}

/// What every assistant call needs before talking to the model.
struct PreparedTurn {
    client: Arc<AnthropicClient>,
    prompt: String,
    history: Vec<ChatMessage>,
    context_prompt: String,
}

impl AppState {
    fn assistant_client(&self) -> ApiResult<Arc<AnthropicClient>> {
        self.assistant
            .clone()
            .ok_or_else(|| ApiError::Unavailable("assistant is not configured".into()))
    }

    /// Load history, gather capture context, and record the user turn.
    async fn prepare_turn(&self, prompt: &str) -> ApiResult<PreparedTurn> {
        let client = self.assistant_client()?;
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ApiError::BadRequest("prompt must not be empty".into()));
        }

        let mut history = self.store.fetch_chat_messages(self.history_limit).await?;
        history.reverse();

        let range = parse_time_range(prompt, &Local::now());
        let terms = extract_search_terms(prompt);
        let captures = if terms.is_empty() {
            Vec::new()
        } else {
            let query = SearchQuery {
                text: terms,
                start_ms: range.start_ms,
                end_ms: range.end_ms,
                limit: self.context_captures,
            };
            self.store.search_captures(query).await.unwrap_or_else(|err| {
                warn!("capture context search failed: {err:#}");
                Vec::new()
            })
        };
        info!(history = history.len(), context = captures.len(), "assistant turn prepared");

        self.store.insert_chat_message("user", prompt).await?;
        Ok(PreparedTurn {
            client,
            prompt: prompt.to_string(),
            context_prompt: build_context_prompt(prompt, &captures),
            history,
        })
    }
}

#[instrument(skip_all, fields(model = input.model.as_deref().unwrap_or("default")))]
pub async fn run_assistant(
    State(state): State<AppState>,
    Json(input): Json<AssistantInput>,
) -> ApiResult<Json<ChatMessage>> {
    let turn = state.prepare_turn(&input.prompt).await?;

    let reply = turn
        .client
        .send_message(
            &turn.history,
            &turn.context_prompt,
            input.model.as_deref(),
            input.max_tokens,
        )
        .await
        .map_err(|err| ApiError::Upstream(format!("{err:#}")))?;

    let message = state.store.insert_chat_message("assistant", &reply).await?;
    state
        .events
        .publish(ServerEvent::chat("assistant", &message.content));
    info!(prompt_chars = turn.prompt.len(), reply_chars = reply.len(), "assistant replied");
    Ok(Json(message))
}

#[instrument(skip_all, fields(model = input.model.as_deref().unwrap_or("default")))]
pub async fn stream_assistant(
    State(state): State<AppState>,
    Json(input): Json<AssistantInput>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let turn = state.prepare_turn(&input.prompt).await?;

    let upstream = turn
        .client
        .request_stream(
            &turn.history,
            &turn.context_prompt,
            input.model.as_deref(),
            input.max_tokens,
        )
        .await
        .map_err(|err| ApiError::Upstream(format!("{err:#}")))?;

    let (mut deltas, _relay) = spawn_relay(
        Box::pin(upstream.bytes_stream()),
        state.store.clone(),
        state.events.clone(),
    );

    let stream = async_stream::stream! {
        while let Some(text) = deltas.recv().await {
            yield Ok(Event::default().data(text));
        }
    };
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
