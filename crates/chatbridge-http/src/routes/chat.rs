//! Chat endpoints: send, history, clear, new session.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Query, State};
use chatbridge_service::chat::ChatService;

use crate::error::ApiError;
use crate::state::AppState;
use crate::types::{
    ChatMessage, ChatRequest, ChatResponse, ClearResponse, HistoryResponse, NewSessionQuery,
    NewSessionResponse, SessionQuery,
};

use super::helpers::{parse_session_id, validate_title};

/// Send a chat message.
///
/// Persists the user message, relays the conversation to the model and
/// returns the assistant reply. Without a usable `session_id` a new
/// session is created.
#[utoipa::path(
    post,
    path = "/api/chat",
    params(SessionQuery),
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Assistant reply", body = ChatResponse),
        (status = 400, description = "Malformed session ID", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid request body", body = crate::error::ErrorBody),
        (status = 429, description = "Rate limit exceeded", body = crate::error::ErrorBody),
        (status = 500, description = "Gateway failure", body = crate::error::ErrorBody),
    ),
    tag = "Chat"
)]
pub async fn send_message(
    State(state): State<AppState>,
    query: Result<Query<SessionQuery>, QueryRejection>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Query(query) = query?;
    let Json(request) = body?;
    let session_id = parse_session_id(query.session_id.as_deref())?;

    let reply = ChatService::send(
        state.history(),
        state.gateway(),
        state.metrics(),
        request,
        session_id,
    )
    .await?;

    Ok(Json(ChatResponse {
        message: reply.message,
        success: true,
        error: None,
        session_id: reply.session_id,
    }))
}

/// Get chat history.
///
/// Returns the messages of the given session, else of the current one.
/// When there is no current session a new one is created.
#[utoipa::path(
    get,
    path = "/api/chat/history",
    params(SessionQuery),
    responses(
        (status = 200, description = "Session messages", body = HistoryResponse),
        (status = 400, description = "Malformed session ID", body = crate::error::ErrorBody),
        (status = 404, description = "Session not found", body = crate::error::ErrorBody),
    ),
    tag = "Chat"
)]
pub async fn history(
    State(state): State<AppState>,
    query: Result<Query<SessionQuery>, QueryRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Query(query) = query?;
    let requested = parse_session_id(query.session_id.as_deref())?;

    let session_id = state.history().resolve_session(requested).await?;
    let messages: Vec<ChatMessage> = state
        .history()
        .history(session_id)
        .await?
        .iter()
        .map(ChatMessage::from)
        .collect();

    Ok(Json(HistoryResponse {
        count: messages.len(),
        messages,
        session_id,
    }))
}

/// Clear chat history.
///
/// Deletes every message of the given (or current) session. The session
/// itself is kept.
#[utoipa::path(
    post,
    path = "/api/chat/clear",
    params(SessionQuery),
    responses(
        (status = 200, description = "History cleared", body = ClearResponse),
        (status = 400, description = "Malformed session ID", body = crate::error::ErrorBody),
    ),
    tag = "Chat"
)]
pub async fn clear(
    State(state): State<AppState>,
    query: Result<Query<SessionQuery>, QueryRejection>,
) -> Result<Json<ClearResponse>, ApiError> {
    let Query(query) = query?;
    let session_id = parse_session_id(query.session_id.as_deref())?
        .or_else(|| state.history().current_session());

    let Some(session_id) = session_id else {
        return Ok(Json(ClearResponse {
            message: "No active session".to_string(),
            session_id: None,
            deleted_count: None,
            success: false,
        }));
    };

    let deleted = state.history().clear_history(session_id).await?;
    Ok(Json(ClearResponse {
        message: format!("Chat history cleared ({deleted} messages)"),
        session_id: Some(session_id),
        deleted_count: Some(deleted),
        success: true,
    }))
}

/// Start a new session.
#[utoipa::path(
    post,
    path = "/api/chat/new-session",
    params(NewSessionQuery),
    responses(
        (status = 200, description = "Session created", body = NewSessionResponse),
        (status = 422, description = "Title too long", body = crate::error::ErrorBody),
    ),
    tag = "Chat"
)]
pub async fn new_session(
    State(state): State<AppState>,
    query: Result<Query<NewSessionQuery>, QueryRejection>,
) -> Result<Json<NewSessionResponse>, ApiError> {
    let Query(query) = query?;
    let title = match query.title.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(t) => Some(validate_title(Some(t))?),
    };

    let session = state.history().create_session(title.as_deref()).await?;
    Ok(Json(NewSessionResponse {
        message: "New session created".to_string(),
        session_id: session.id,
        title: session.title,
        success: true,
    }))
}
