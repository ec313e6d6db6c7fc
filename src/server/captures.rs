use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::{ApiError, ApiResult};
use crate::storage::{CaptureWithWindows, SearchQuery, StorageStats};

const DEFAULT_SEARCH_LIMIT: i64 = 20;
const MAX_SEARCH_LIMIT: i64 = 200;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Deserialize)]
pub struct ListParams {
    limit: Option<i64>,
}

/// Metadata only; images are fetched separately through `/captures/images`.
pub async fn list_captures(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<CaptureWithWindows>>> {
    let limit = params.limit.unwrap_or(i64::MAX);
    Ok(Json(state.store.fetch_captures_metadata(limit).await?))
}

#[derive(Deserialize)]
pub struct ImageParams {
    #[serde(default)]
    ids: String,
}

pub async fn capture_images(
    State(state): State<AppState>,
    Query(params): Query<ImageParams>,
) -> ApiResult<Json<HashMap<i64, String>>> {
    let ids = parse_ids(&params.ids);
    if ids.is_empty() {
        return Ok(Json(HashMap::new()));
    }
    Ok(Json(state.store.fetch_images_for_captures(ids).await?))
}

/// Comma-separated ids; anything non-numeric is skipped.
fn parse_ids(raw: &str) -> Vec<i64> {
    raw.split(',').filter_map(|s| s.trim().parse().ok()).collect()
}

#[derive(Deserialize)]
pub struct SearchParams {
    q: Option<String>,
    start_ms: Option<i64>,
    end_ms: Option<i64>,
    limit: Option<i64>,
}

pub async fn search_captures(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<CaptureWithWindows>>> {
    let text = params
        .q
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing query parameter `q`".into()))?;

    let query = SearchQuery {
        text,
        start_ms: params.start_ms,
        end_ms: params.end_ms,
        limit: params
            .limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT),
    };
    Ok(Json(state.store.search_captures(query).await?))
}

pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<StorageStats>> {
    Ok(Json(state.store.stats().await?))
}
