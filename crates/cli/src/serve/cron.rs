//! Sweeper trigger for an external scheduler.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use serde_json::json;
use tracing::warn;

use super::error::{json_ok, ApiError, ApiResult};
use super::middleware::credential;
use super::state::AppState;
use crate::identity::digest;

/// GET|POST /cron/auto-approve-submissions
///
/// Refuses every call when no secret is configured.
pub(crate) async fn handle_auto_approve(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult {
    let Some(expected) = state.cron_secret_digest.as_deref() else {
        warn!("sweeper call refused: no cron secret configured");
        return Err(ApiError::unauthenticated("Cron secret is not configured"));
    };
    if credential(&headers).map(digest).as_deref() != Some(expected) {
        warn!("sweeper call refused: bad cron secret");
        return Err(ApiError::unauthenticated("Unauthorized"));
    }

    let report = state.market.sweep().await?;
    json_ok(json!({
        "message": report.message(),
        "processed": report.processed,
        "approved": report.approved,
        "errors": report.errors,
    }))
}
