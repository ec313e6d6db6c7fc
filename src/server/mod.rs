//! Local HTTP API consumed by the memri UI.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Liveness |
//! | `GET` | `/captures` | Capture metadata, newest first |
//! | `GET` | `/captures/images` | Base64 PNGs for `ids=1,2,3` |
//! | `GET` | `/captures/search` | Keyword search with optional time bounds |
//! | `GET` | `/stats` | Storage counters |
//! | `GET` | `/events` | SSE stream of capture and chat notifications |
//! | `GET`/`POST` | `/chat` | Chat history / append a message |
//! | `GET`/`POST` | `/assistant` | Chat history / ask the assistant |
//! | `GET`/`POST` | `/assistant/stream` | Chat history / streamed answer over SSE |

mod assistant;
mod auth;
mod captures;
mod chat;
mod sse;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::{middleware, Router};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::assistant::AnthropicClient;
use crate::config::MemriConfig;
use crate::events::EventBus;
use crate::storage::Store;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub events: EventBus,
    pub assistant: Option<Arc<AnthropicClient>>,
    /// Chat turns sent to the model as history.
    pub history_limit: i64,
    /// Captures quoted to the model as context.
    pub context_captures: i64,
}

impl AppState {
    pub fn new(store: Store, events: EventBus, assistant: Option<AnthropicClient>) -> Self {
        let defaults = crate::config::AssistantConfig::default();
        Self {
            store,
            events,
            assistant: assistant.map(Arc::new),
            history_limit: defaults.history_limit as i64,
            context_captures: defaults.context_captures as i64,
        }
    }

    pub fn from_config(config: &MemriConfig, store: Store, events: EventBus) -> Result<Self> {
        let assistant = AnthropicClient::from_config(&config.assistant)?;
        if assistant.is_none() {
            info!("ANTHROPIC_API_KEY not set; assistant endpoints will return 503");
        }
        let mut state = Self::new(store, events, assistant);
        state.history_limit = config.assistant.history_limit as i64;
        state.context_captures = config.assistant.context_captures as i64;
        Ok(state)
    }
}

pub fn build_router(state: AppState, api_key: Option<String>) -> Router {
    let api_key: Option<Arc<str>> = api_key
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .map(Arc::from);

    Router::new()
        .route("/health", get(captures::health))
        .route("/captures", get(captures::list_captures))
        .route("/captures/images", get(captures::capture_images))
        .route("/captures/search", get(captures::search_captures))
        .route("/stats", get(captures::stats))
        .route("/events", get(sse::events))
        .route("/chat", get(chat::list_messages).post(chat::add_message))
        .route(
            "/assistant",
            get(chat::list_messages).post(assistant::run_assistant),
        )
        .route(
            "/assistant/stream",
            get(chat::list_messages).post(assistant::stream_assistant),
        )
        .with_state(state)
        .layer(middleware::from_fn_with_state(api_key, auth::enforce_api_key))
        .layer(CorsLayer::permissive())
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    addr: &str,
    api_key: Option<String>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid API address {addr:?}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "API server listening at http://{addr}");

    axum::serve(listener, build_router(state, api_key))
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server failed")?;
    info!("API server stopped");
    Ok(())
}
