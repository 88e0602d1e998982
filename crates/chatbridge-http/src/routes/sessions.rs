//! Session management endpoints.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Json, Path, Query, State};

use crate::error::ApiError;
use crate::state::AppState;
use crate::types::{
    ChatMessage, DeleteSessionResponse, ListSessionsQuery, SessionListResponse, SessionStats,
    SwitchSessionResponse, TitleQuery, UpdateSessionResponse,
};

use super::helpers::{parse_path_id, validate_title};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 100;

/// List sessions.
///
/// Active sessions, most recently updated first.
#[utoipa::path(
    get,
    path = "/api/chat/sessions",
    params(ListSessionsQuery),
    responses(
        (status = 200, description = "Session page", body = SessionListResponse),
        (status = 422, description = "Limit or offset out of range", body = crate::error::ErrorBody),
    ),
    tag = "Sessions"
)]
pub async fn list_sessions(
    State(state): State<AppState>,
    query: Result<Query<ListSessionsQuery>, QueryRejection>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let offset = query.offset.unwrap_or(0);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ApiError::Validation(format!(
            "limit must be between 1 and {MAX_LIMIT}"
        )));
    }
    let offset = u32::try_from(offset)
        .map_err(|_| ApiError::Validation("offset must be a non-negative integer".to_string()))?;

    let sessions = state.history().list_sessions(limit as u32, offset).await?;
    Ok(Json(SessionListResponse {
        count: sessions.len(),
        sessions,
        current_session_id: state.history().current_session(),
    }))
}

/// Switch session.
///
/// Makes the session current and returns its messages.
#[utoipa::path(
    post,
    path = "/api/chat/sessions/{session_id}/switch",
    params(("session_id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session switched", body = SwitchSessionResponse),
        (status = 400, description = "Malformed session ID", body = crate::error::ErrorBody),
        (status = 404, description = "Session not found", body = crate::error::ErrorBody),
    ),
    tag = "Sessions"
)]
pub async fn switch_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SwitchSessionResponse>, ApiError> {
    let id = parse_path_id(&session_id)?;
    let (session, messages) = state.history().switch_session(id).await?;

    Ok(Json(SwitchSessionResponse {
        message: "Session switched".to_string(),
        session_id: id,
        title: session.title,
        messages: messages.iter().map(ChatMessage::from).collect(),
        success: true,
    }))
}

/// Delete session.
///
/// Removes the session and its messages. Deleting the current session
/// starts a new one.
#[utoipa::path(
    delete,
    path = "/api/chat/sessions/{session_id}",
    params(("session_id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session deleted", body = DeleteSessionResponse),
        (status = 400, description = "Malformed session ID", body = crate::error::ErrorBody),
        (status = 404, description = "Session not found", body = crate::error::ErrorBody),
    ),
    tag = "Sessions"
)]
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<DeleteSessionResponse>, ApiError> {
    let id = parse_path_id(&session_id)?;
    if !state.history().delete_session(id).await? {
        return Err(ApiError::NotFound("Session not found".to_string()));
    }

    Ok(Json(DeleteSessionResponse {
        message: "Session deleted".to_string(),
        session_id: id,
        success: true,
    }))
}

/// Rename session.
#[utoipa::path(
    patch,
    path = "/api/chat/sessions/{session_id}",
    params(("session_id" = String, Path, description = "Session ID"), TitleQuery),
    responses(
        (status = 200, description = "Session updated", body = UpdateSessionResponse),
        (status = 400, description = "Malformed session ID", body = crate::error::ErrorBody),
        (status = 404, description = "Session not found", body = crate::error::ErrorBody),
        (status = 422, description = "Missing or invalid title", body = crate::error::ErrorBody),
    ),
    tag = "Sessions"
)]
pub async fn update_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    query: Result<Query<TitleQuery>, QueryRejection>,
) -> Result<Json<UpdateSessionResponse>, ApiError> {
    let id = parse_path_id(&session_id)?;
    let Query(query) = query?;
    let title = validate_title(query.title.as_deref())?;

    if !state.history().update_session_title(id, &title).await? {
        return Err(ApiError::NotFound("Session not found".to_string()));
    }

    Ok(Json(UpdateSessionResponse {
        message: "Session updated".to_string(),
        session_id: id,
        title,
        success: true,
    }))
}

/// Session statistics.
///
/// Message counts by role, token sums and mean response time.
#[utoipa::path(
    get,
    path = "/api/chat/sessions/{session_id}/stats",
    params(("session_id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session statistics", body = SessionStats),
        (status = 400, description = "Malformed session ID", body = crate::error::ErrorBody),
        (status = 404, description = "Session not found", body = crate::error::ErrorBody),
    ),
    tag = "Sessions"
)]
pub async fn session_stats(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStats>, ApiError> {
    let id = parse_path_id(&session_id)?;
    let stats = state
        .history()
        .session_stats(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;
    Ok(Json(stats))
}
