use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;

/// Reject requests without a matching `x-api-key` when a key is configured.
pub async fn enforce_api_key(
    State(expected): State<Option<Arc<str>>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = expected {
        let provided = req.headers().get("x-api-key").and_then(|v| v.to_str().ok());
        if provided != Some(&*expected) {
            tracing::debug!(path = %req.uri().path(), "rejected request without valid API key");
            return Err(ApiError::Unauthorized);
        }
    }
    Ok(next.run(req).await)
}
