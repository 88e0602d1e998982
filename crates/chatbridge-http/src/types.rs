//! Request query parameters and response bodies of the REST API.
//!
//! Domain types (`ChatMessage`, `SessionSummary`, `ModelInfo`, ...) come from
//! `chatbridge_service::types` and are re-exported here.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

pub use chatbridge_service::types::{
    ChatMessage, ChatRequest, ImageData, MessageRole, ModelInfo, SessionStats, SessionSummary,
};

// --- Query parameters ---

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SessionQuery {
    /// Session ID to use. Defaults to the current session.
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NewSessionQuery {
    /// Optional session title.
    pub title: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListSessionsQuery {
    /// Maximum sessions to return (1-100, default 50).
    pub limit: Option<i64>,
    /// Pagination offset (default 0).
    pub offset: Option<i64>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TitleQuery {
    /// New session title.
    pub title: Option<String>,
}

// --- Responses ---

/// Reply to a chat message.
#[derive(Serialize, ToSchema)]
pub struct ChatResponse {
    pub message: ChatMessage,
    pub success: bool,
    pub error: Option<String>,
    pub session_id: Uuid,
}

/// Messages of one session.
#[derive(Serialize, ToSchema)]
pub struct HistoryResponse {
    pub messages: Vec<ChatMessage>,
    pub count: usize,
    pub session_id: Uuid,
}

#[derive(Serialize, ToSchema)]
pub struct ClearResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_count: Option<u64>,
    pub success: bool,
}

#[derive(Serialize, ToSchema)]
pub struct NewSessionResponse {
    pub message: String,
    pub session_id: Uuid,
    pub title: String,
    pub success: bool,
}

#[derive(Serialize, ToSchema)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
    pub count: usize,
    pub current_session_id: Option<Uuid>,
}

#[derive(Serialize, ToSchema)]
pub struct SwitchSessionResponse {
    pub message: String,
    pub session_id: Uuid,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub success: bool,
}

#[derive(Serialize, ToSchema)]
pub struct DeleteSessionResponse {
    pub message: String,
    pub session_id: Uuid,
    pub success: bool,
}

#[derive(Serialize, ToSchema)]
pub struct UpdateSessionResponse {
    pub message: String,
    pub session_id: Uuid,
    pub title: String,
    pub success: bool,
}

/// Free models available for chat.
#[derive(Serialize, ToSchema)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
    pub count: usize,
}

/// Liveness report.
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Always "healthy" when the server answers.
    pub status: String,
    pub service: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// Stored sessions.
    pub sessions: i64,
    /// Stored messages.
    pub messages: i64,
}

/// Welcome document served at `/`.
#[derive(Serialize, ToSchema)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
    pub docs: String,
    pub health: String,
    pub metrics: String,
}
