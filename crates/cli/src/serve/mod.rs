//! `suitedbot serve`: the marketplace HTTP JSON API.
//!
//! Every response body is a JSON object with a `success` flag, an `error`
//! message on failure, and the payload fields on success.
//!
//! Authentication is `Authorization: Bearer <token>` or `X-API-Key: <token>`,
//! resolved through an [`IdentityProvider`]. Listing endpoints are public.
//!
//! Endpoints:
//! - GET  /health
//! - GET  /tasks?status&target_type&category
//! - POST /tasks
//! - GET  /tasks/{id}
//! - POST /tasks/{id}/offer
//! - POST /offers/{id}/respond
//! - POST /tasks/{id}/submit
//! - GET  /submissions/{id}/review     (poster or submitter)
//! - POST /submissions/{id}/review     (poster)
//! - GET  /tasks/{id}/review-poster
//! - POST /tasks/{id}/review-poster    (worker)
//! - POST /tasks/{id}/review-worker    (poster)
//! - GET  /users/{id}/poster-reviews?page&limit
//! - GET|POST /cron/auto-approve-submissions   (cron secret)
//! - GET  /bot/scan?target_type&limit
//! - POST /bot/suggest
//! - GET|POST /bot/master-approve
//! - POST /bot/auto-accept

mod bots;
mod cron;
mod error;
mod handlers;
mod middleware;
mod reviews;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::identity::{self, IdentityProvider};

use self::handlers::{
    handle_create_offer, handle_create_task, handle_get_submission, handle_get_task,
    handle_health, handle_list_tasks, handle_not_found, handle_respond_to_offer,
    handle_review_submission, handle_submit_work,
};
use self::middleware::identity_middleware;
pub(crate) use self::state::Market;
use self::state::AppState;

/// Maximum request body size: 1 MB.
const MAX_BODY_SIZE: usize = 1024 * 1024;

pub(crate) struct ServeOptions {
    pub(crate) listen: SocketAddr,
    /// Shared secret for the sweeper endpoint. `None` refuses every call.
    pub(crate) cron_secret: Option<String>,
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/tasks", get(handle_list_tasks).post(handle_create_task))
        .route("/tasks/{id}", get(handle_get_task))
        .route("/tasks/{id}/offer", post(handle_create_offer))
        .route("/offers/{id}/respond", post(handle_respond_to_offer))
        .route("/tasks/{id}/submit", post(handle_submit_work))
        .route(
            "/submissions/{id}/review",
            get(handle_get_submission).post(handle_review_submission),
        )
        .route(
            "/tasks/{id}/review-poster",
            get(reviews::handle_list_task_reviews).post(reviews::handle_review_poster),
        )
        .route(
            "/tasks/{id}/review-worker",
            post(reviews::handle_review_worker),
        )
        .route(
            "/users/{id}/poster-reviews",
            get(reviews::handle_poster_reviews),
        )
        .route(
            "/cron/auto-approve-submissions",
            get(cron::handle_auto_approve).post(cron::handle_auto_approve),
        )
        .route("/bot/scan", get(bots::handle_scan))
        .route("/bot/suggest", post(bots::handle_suggest))
        .route(
            "/bot/master-approve",
            get(bots::handle_list_suggestions).post(bots::handle_decide_suggestion),
        )
        .route("/bot/auto-accept", post(bots::handle_auto_accept))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            identity_middleware,
        ))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Serve the API until Ctrl+C.
pub(crate) async fn start_server(
    market: Market,
    identity: Box<dyn IdentityProvider>,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let cron_secret_digest = options
        .cron_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(identity::digest);
    if cron_secret_digest.is_none() {
        error!(
            "CRON_SECRET is not configured; \
             /cron/auto-approve-submissions will refuse every request"
        );
    }
    info!(
        auto_approve_hours = market.config().auto_approve_hours(),
        "marketplace ready"
    );

    let state = Arc::new(AppState {
        market,
        identity,
        cron_secret_digest,
    });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(options.listen).await?;
    info!("SuitedBot listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal"),
        Err(e) => {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    }
}
