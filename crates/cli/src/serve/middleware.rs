//! Credential resolution.
//!
//! The middleware resolves a presented credential to a user and stores it in
//! the request extensions. Handlers that need a user take [`Authenticated`].
//! A request without a credential passes through so public endpoints work.

use std::sync::Arc;

use axum::extract::{FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use suitedbot_core::UserId;

use super::error::{json_error, ApiError};
use super::state::AppState;

#[derive(Debug, Clone, Copy)]
struct Caller(UserId);

/// The authenticated user making the request.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Authenticated(pub(crate) UserId);

impl<S: Send + Sync> FromRequestParts<S> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Caller>()
            .map(|caller| Authenticated(caller.0))
            .ok_or_else(|| ApiError::unauthenticated("Authentication required"))
    }
}

/// `Authorization: Bearer <token>`, falling back to `X-API-Key: <token>`.
pub(crate) fn credential(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    bearer
        .or_else(|| headers.get("x-api-key").and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub(crate) async fn identity_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    // The sweeper endpoint authenticates with the cron secret instead.
    let path = request.uri().path();
    if path == "/health" || path.starts_with("/cron/") {
        return next.run(request).await;
    }

    let Some(token) = credential(request.headers()).map(str::to_owned) else {
        return next.run(request).await;
    };
    match state.identity.resolve(&token).await {
        Some(user) => {
            request.extensions_mut().insert(Caller(user));
            next.run(request).await
        }
        None => json_error(StatusCode::UNAUTHORIZED, "Invalid API key"),
    }
}
