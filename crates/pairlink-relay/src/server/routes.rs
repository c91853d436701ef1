//! HTTP endpoints for creating, inspecting and closing sessions.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;

use crate::registry::SessionStatus;
use crate::server::AppState;

/// Body returned by `POST /api/session`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub token: String,
    pub phone_url: String,
}

/// Errors surfaced by the HTTP endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unknown id, or a token that does not match it.
    #[error("Session not found")]
    SessionNotFound,

    #[error("Missing bearer token")]
    MissingToken,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::SessionNotFound => StatusCode::NOT_FOUND,
            Self::MissingToken => StatusCode::UNAUTHORIZED,
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// `GET /` -- liveness probe.
pub async fn root() -> impl IntoResponse {
    Json(json!({
        "service": "pairlink signaling relay",
        "status": "running",
    }))
}

/// `POST /api/session` -- open a new pairing session.
pub async fn create_session(State(state): State<AppState>) -> Json<CreateSessionResponse> {
    let creds = state.registry.create().await;
    let phone_url = state.config.phone_url(&creds.session_id, &creds.token);
    Json(CreateSessionResponse {
        session_id: creds.session_id,
        token: creds.token,
        phone_url,
    })
}

/// `GET /api/session/{session_id}` -- which roles are connected.
pub async fn session_status(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<SessionStatus>, ApiError> {
    state
        .registry
        .get(&session_id)
        .await
        .map(|session| Json(session.status()))
        .ok_or(ApiError::SessionNotFound)
}

/// `DELETE /api/session/{session_id}` -- end a session early.
///
/// Requires `Authorization: Bearer <token>`.
pub async fn close_session(
    Path(session_id): Path<String>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let token = bearer_token(&headers).ok_or(ApiError::MissingToken)?;
    if state.registry.close(&session_id, token).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::SessionNotFound)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
