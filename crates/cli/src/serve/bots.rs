//! Bot delegation routes. The bot authenticates with its own token; the
//! master authenticates as themselves to decide suggestions.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::json;
use suitedbot_core::{OfferId, TaskId};
use suitedbot_market::{AutoAcceptInput, MarketError, ScanQuery, SuggestionInput};
use time::format_description::well_known::Rfc3339;

use super::error::{json_ok, parse_body, parse_id, ApiError, ApiResult};
use super::middleware::Authenticated;
use super::state::AppState;

#[derive(Debug, Default, Deserialize)]
struct SuggestBody {
    task_id: Option<String>,
    #[serde(flatten)]
    input: SuggestionInput,
}

#[derive(Debug, Default, Deserialize)]
struct AutoAcceptBody {
    task_id: Option<String>,
    #[serde(flatten)]
    input: AutoAcceptInput,
}

#[derive(Debug, Default, Deserialize)]
struct DecisionBody {
    offer_id: Option<String>,
    action: Option<String>,
}

fn parse_task_id(raw: Option<&str>) -> Result<TaskId, MarketError> {
    let raw = raw.ok_or_else(|| MarketError::validation("task_id is required"))?;
    raw.parse()
        .map_err(|_| MarketError::not_found("Task not found"))
}

/// GET /bot/scan?target_type&limit
pub(crate) async fn handle_scan(
    State(state): State<Arc<AppState>>,
    Authenticated(bot): Authenticated,
    query: Result<Query<ScanQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query.map_err(|e| MarketError::validation(e.body_text()))?;
    let tasks = state.market.scan_tasks(bot, &query).await?;
    let scanned_at = state
        .market
        .now()
        .format(&Rfc3339)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let count = tasks.len();
    json_ok(json!({
        "count": count,
        "tasks": tasks,
        "scanned_at": scanned_at,
    }))
}

/// POST /bot/suggest
pub(crate) async fn handle_suggest(
    State(state): State<Arc<AppState>>,
    Authenticated(bot): Authenticated,
    body: Bytes,
) -> ApiResult {
    let body: SuggestBody = parse_body(&body)?;
    let task_id = parse_task_id(body.task_id.as_deref())?;
    let suggestion = state.market.suggest_offer(bot, task_id, body.input).await?;
    json_ok(json!({
        "suggestion": suggestion,
        "message": "Suggestion sent to your master for approval",
    }))
}

/// GET /bot/master-approve
pub(crate) async fn handle_list_suggestions(
    State(state): State<Arc<AppState>>,
    Authenticated(master): Authenticated,
) -> ApiResult {
    let suggestions = state.market.list_suggestions(master).await?;
    json_ok(json!({ "suggestions": suggestions }))
}

/// POST /bot/master-approve
pub(crate) async fn handle_decide_suggestion(
    State(state): State<Arc<AppState>>,
    Authenticated(master): Authenticated,
    body: Bytes,
) -> ApiResult {
    let body: DecisionBody = parse_body(&body)?;
    let raw = body
        .offer_id
        .as_deref()
        .ok_or_else(|| MarketError::validation("offer_id is required"))?;
    let offer_id: OfferId = parse_id(raw, "Suggestion")?;
    let approve = match body.action.as_deref() {
        Some("approve") => true,
        Some("reject") => false,
        _ => {
            return Err(
                MarketError::validation("Invalid action. Must be 'approve' or 'reject'").into(),
            )
        }
    };
    let offer = state
        .market
        .decide_suggestion(offer_id, master, approve)
        .await?;
    json_ok(json!({ "offer": offer }))
}

/// POST /bot/auto-accept
pub(crate) async fn handle_auto_accept(
    State(state): State<Arc<AppState>>,
    Authenticated(bot): Authenticated,
    body: Bytes,
) -> ApiResult {
    let body: AutoAcceptBody = parse_body(&body)?;
    let task_id = parse_task_id(body.task_id.as_deref())?;
    let offer = state.market.auto_accept(bot, task_id, body.input).await?;
    json_ok(json!({ "offer": offer }))
}
