use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::{debug, warn};

use crate::commands::CommandRouter;
use crate::telegram::{Update, parse_update};

#[derive(Clone)]
pub struct WebhookState {
    router: Arc<CommandRouter>,
    bot_token: Arc<str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    active_jobs: usize,
}

/// Updates are accepted on `POST /{token}`; any other path answers 404, which
/// is also what the keep-alive ping expects from `/`.
pub fn app(router: Arc<CommandRouter>, bot_token: &str) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/{token}", post(receive_update))
        .with_state(WebhookState {
            router,
            bot_token: Arc::from(bot_token),
        })
}

pub(crate) async fn healthz(State(state): State<WebhookState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        active_jobs: state.router.registry().active_job_count(),
    })
}

pub(crate) async fn receive_update(
    State(state): State<WebhookState>,
    Path(token): Path<String>,
    body: Bytes,
) -> StatusCode {
    if token != *state.bot_token {
        return StatusCode::NOT_FOUND;
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(err) => {
            warn!(error = %err, "rejecting malformed telegram update");
            return StatusCode::BAD_REQUEST;
        }
    };

    match parse_update(&update) {
        Some(event) => state.router.handle(event).await,
        None => debug!(update_id = update.update_id, "skipping non-text update"),
    }

    StatusCode::OK
}
