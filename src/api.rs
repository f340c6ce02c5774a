//! HTTP endpoints next to the web chat: liveness and session audit.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

use crate::channels::ChannelManager;
use crate::conversation::UserId;
use crate::store::{AnswerSink, SessionStore};

/// Shared state for the API routes.
#[derive(Clone)]
pub struct ApiState {
    pub sessions: Arc<dyn SessionStore>,
    pub answers: Arc<dyn AnswerSink>,
    pub channels: Arc<ChannelManager>,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// GET /health
async fn health() -> &'static str {
    "Server is running."
}

/// GET /api/channels
///
/// Health of every registered channel.
async fn channel_health(State(state): State<ApiState>) -> impl IntoResponse {
    let results = state.channels.health_check_all().await;
    let body: serde_json::Map<String, serde_json::Value> = results
        .into_iter()
        .map(|(name, result)| {
            let status = match result {
                Ok(()) => serde_json::json!({ "healthy": true }),
                Err(e) => serde_json::json!({ "healthy": false, "error": e.to_string() }),
            };
            (name, status)
        })
        .collect();
    Json(body)
}

/// GET /api/sessions/{user_id}
///
/// The stored session for `channel:id`, or 404.
async fn get_session(State(state): State<ApiState>, Path(user_id): Path<String>) -> Response {
    let Some(user) = UserId::parse(&user_id) else {
        return error(StatusCode::BAD_REQUEST, "user id must look like channel:id");
    };
    match state.sessions.get(&user).await {
        Ok(Some(session)) => Json(session).into_response(),
        Ok(None) => error(StatusCode::NOT_FOUND, format!("no session for {user}")),
        Err(e) => {
            tracing::error!(user = %user, error = %e, "Session lookup failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, "session lookup failed")
        }
    }
}

/// GET /api/sessions/{user_id}/answers
///
/// Every answer ever recorded for the user, across sessions.
async fn get_answers(State(state): State<ApiState>, Path(user_id): Path<String>) -> Response {
    let Some(user) = UserId::parse(&user_id) else {
        return error(StatusCode::BAD_REQUEST, "user id must look like channel:id");
    };
    match state.answers.answers_for(&user).await {
        Ok(answers) => Json(answers).into_response(),
        Err(e) => {
            tracing::error!(user = %user, error = %e, "Answer lookup failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, "answer lookup failed")
        }
    }
}

/// Build the API routes.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/channels", get(channel_health))
        .route("/api/sessions/{user_id}", get(get_session))
        .route("/api/sessions/{user_id}/answers", get(get_answers))
        .with_state(state)
}
