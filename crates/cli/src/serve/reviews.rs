//! Review routes.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::json;
use suitedbot_core::{TaskId, UserId};
use suitedbot_market::{MarketError, ReviewInput};

use super::error::{json_ok, parse_body, parse_id, ApiResult};
use super::middleware::Authenticated;
use super::state::AppState;

/// POST /tasks/{id}/review-poster
pub(crate) async fn handle_review_poster(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Authenticated(user): Authenticated,
    body: Bytes,
) -> ApiResult {
    let task_id: TaskId = parse_id(&id, "Task")?;
    let input: ReviewInput = parse_body(&body)?;
    let review = state.market.review_poster(task_id, user, input).await?;
    json_ok(json!({ "review": review }))
}

/// GET /tasks/{id}/review-poster
pub(crate) async fn handle_list_task_reviews(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    let task_id: TaskId = parse_id(&id, "Task")?;
    let reviews = state.market.list_task_reviews(task_id).await?;
    json_ok(json!({ "reviews": reviews }))
}

/// POST /tasks/{id}/review-worker
pub(crate) async fn handle_review_worker(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Authenticated(user): Authenticated,
    body: Bytes,
) -> ApiResult {
    let task_id: TaskId = parse_id(&id, "Task")?;
    let input: ReviewInput = parse_body(&body)?;
    let review = state.market.review_worker(task_id, user, input).await?;
    json_ok(json!({ "review": review }))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PageQuery {
    page: Option<u32>,
    limit: Option<u32>,
}

/// GET /users/{id}/poster-reviews
pub(crate) async fn handle_poster_reviews(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult {
    let user_id: UserId = parse_id(&id, "User")?;
    let Query(query) = query.map_err(|e| MarketError::validation(e.body_text()))?;
    let page = state
        .market
        .poster_reviews(user_id, query.page, query.limit)
        .await?;
    json_ok(page)
}
