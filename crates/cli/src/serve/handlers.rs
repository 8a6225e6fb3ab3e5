//! Route handlers for health, tasks, offers, and submissions.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;
use suitedbot_core::{OfferId, SubmissionId, TaskId};
use suitedbot_market::{
    MarketError, NewOffer, NewSubmission, NewTask, OfferResponse, ReviewAction, TaskQuery,
};
use time::format_description::well_known::Rfc3339;

use super::error::{json_error, json_ok, parse_body, parse_id, ApiError, ApiResult};
use super::middleware::Authenticated;
use super::state::AppState;

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, "Not found")
}

/// GET /health
pub(crate) async fn handle_health() -> ApiResult {
    json_ok(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ── Tasks ─────────────────────────────────────────────────────────────────────

/// POST /tasks
pub(crate) async fn handle_create_task(
    State(state): State<Arc<AppState>>,
    Authenticated(user): Authenticated,
    body: Bytes,
) -> ApiResult {
    let input: NewTask = parse_body(&body)?;
    let task = state.market.create_task(user, input).await?;
    json_ok(json!({ "task": task }))
}

/// GET /tasks
pub(crate) async fn handle_list_tasks(
    State(state): State<Arc<AppState>>,
    query: Result<Query<TaskQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query.map_err(|e| MarketError::validation(e.body_text()))?;
    let tasks = state.market.list_tasks(&query).await?;
    json_ok(json!({ "tasks": tasks }))
}

/// GET /tasks/{id}
pub(crate) async fn handle_get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: TaskId = parse_id(&id, "Task")?;
    let detail = state.market.get_task_detail(id).await?;
    json_ok(json!({ "task": detail }))
}

// ── Offers ────────────────────────────────────────────────────────────────────

/// POST /tasks/{id}/offer
pub(crate) async fn handle_create_offer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Authenticated(user): Authenticated,
    body: Bytes,
) -> ApiResult {
    let task_id: TaskId = parse_id(&id, "Task")?;
    let input: NewOffer = parse_body(&body)?;
    let offer = state.market.create_offer(task_id, user, input).await?;
    json_ok(json!({ "offer": offer }))
}

/// POST /offers/{id}/respond
pub(crate) async fn handle_respond_to_offer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Authenticated(user): Authenticated,
    body: Bytes,
) -> ApiResult {
    let offer_id: OfferId = parse_id(&id, "Offer")?;
    let response: OfferResponse = parse_body(&body)?;
    let outcome = state.market.respond_to_offer(offer_id, user, response).await?;
    json_ok(outcome)
}

// ── Submissions ───────────────────────────────────────────────────────────────

/// POST /tasks/{id}/submit
pub(crate) async fn handle_submit_work(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Authenticated(user): Authenticated,
    body: Bytes,
) -> ApiResult {
    let task_id: TaskId = parse_id(&id, "Task")?;
    let input: NewSubmission = parse_body(&body)?;
    let submission = state.market.submit_work(task_id, user, input).await?;
    let hours = state.market.config().auto_approve_hours();
    let auto_approve_at = submission
        .auto_approve_at
        .map(|at| at.format(&Rfc3339))
        .transpose()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    json_ok(json!({
        "submission": submission,
        "auto_approve_at": auto_approve_at,
        "message": format!("Work submitted. Auto-approves in {hours}h if not reviewed"),
    }))
}

#[derive(Debug, Default, Deserialize)]
struct ReviewBody {
    action: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

/// POST /submissions/{id}/review
pub(crate) async fn handle_review_submission(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Authenticated(user): Authenticated,
    body: Bytes,
) -> ApiResult {
    let submission_id: SubmissionId = parse_id(&id, "Submission")?;
    let body: ReviewBody = parse_body(&body)?;
    let action = body
        .action
        .as_deref()
        .and_then(ReviewAction::parse)
        .ok_or_else(|| {
            MarketError::validation("Invalid action. Must be 'approve', 'reject', or 'revision'")
        })?;
    let outcome = state
        .market
        .review_submission(submission_id, user, action, body.notes)
        .await?;
    let can_review_worker = outcome.can_review_worker();
    json_ok(json!({
        "action": outcome.action,
        "submission": outcome.submission,
        "task": outcome.task,
        "transaction": outcome.transaction,
        "can_review_worker": can_review_worker,
    }))
}

/// GET /submissions/{id}/review
pub(crate) async fn handle_get_submission(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Authenticated(user): Authenticated,
) -> ApiResult {
    let submission_id: SubmissionId = parse_id(&id, "Submission")?;
    let view = state
        .market
        .get_submission_for_review(submission_id, user)
        .await?;
    json_ok(view)
}
