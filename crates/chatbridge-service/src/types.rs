//! Transport-agnostic types shared across the service layer.
//!
//! These types are used by `ChatStore`, `ChatHistory`, the gateway client
//! and transport adapters. No HTTP dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Model used when a chat request does not name one.
pub const DEFAULT_MODEL: &str = "meta-llama/llama-3.2-3b-instruct:free";

/// Title given to sessions created without one.
pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

/// Media type assumed for images that do not declare one.
pub const DEFAULT_IMAGE_MEDIA_TYPE: &str = "image/png";

/// Author of a chat message.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    /// Parses a stored role string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Persistent records ---

/// A stored chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSession {
    pub id: Uuid,
    pub title: String,
    pub user_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stored chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub model: Option<String>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    /// Gateway round trip in seconds (assistant messages only).
    pub response_time: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Input for appending a message to a session.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub model: Option<String>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub response_time: Option<f64>,
}

impl NewMessage {
    /// A plain message with no model or usage attached.
    pub fn new(session_id: Uuid, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            session_id,
            role,
            content: content.into(),
            model: None,
            prompt_tokens: None,
            completion_tokens: None,
            response_time: None,
        }
    }
}

// --- Input types ---

/// Base64-encoded image attached to a chat request.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ImageData {
    /// Base64 image payload without a data-URI prefix.
    pub base64_data: String,
    /// MIME type, e.g. `image/jpeg`.
    #[serde(default = "default_media_type")]
    pub media_type: String,
}

fn default_media_type() -> String {
    DEFAULT_IMAGE_MEDIA_TYPE.to_string()
}

/// A user message to relay to the model.
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChatRequest {
    /// User message content.
    pub message: String,
    /// Model ID to use for the response.
    #[serde(default = "default_model")]
    pub model: String,
    /// Optional image for multimodal models.
    #[serde(default)]
    pub image: Option<ImageData>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

// --- Output types ---

/// A message as returned to clients.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub model: Option<String>,
}

impl From<&StoredMessage> for ChatMessage {
    fn from(msg: &StoredMessage) -> Self {
        Self {
            role: msg.role,
            content: msg.content.clone(),
            timestamp: msg.created_at,
            model: msg.model.clone(),
        }
    }
}

/// Session entry returned by the list endpoint.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SessionSummary {
    pub id: Uuid,
    /// Stored title, or the first user message for untitled sessions.
    pub title: String,
    pub message_count: i64,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// True for the current session.
    pub is_active: bool,
}

/// Aggregates over the messages of one session.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SessionStats {
    pub session_id: Uuid,
    pub total_messages: i64,
    pub user_messages: i64,
    pub assistant_messages: i64,
    pub total_prompt_tokens: i64,
    pub total_completion_tokens: i64,
    /// Mean assistant response time in seconds, 0 when unknown.
    pub avg_response_time: f64,
}

/// A model offered by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub context_length: Option<u64>,
    pub supports_images: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub pricing: Option<serde_json::Value>,
}

/// Truncates to 50 characters, appending `...` when anything was cut.
pub(crate) fn preview_title(content: &str) -> String {
    const MAX: usize = 50;
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(MAX).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_title_truncates_long_content() {
        assert_eq!(preview_title("short"), "short");
        let long = "x".repeat(60);
        assert_eq!(preview_title(&long), format!("{}...", "x".repeat(50)));
        assert_eq!(preview_title(&"y".repeat(50)), "y".repeat(50));
    }

    #[test]
    fn preview_title_counts_characters_not_bytes() {
        let text = "ü".repeat(51);
        assert_eq!(preview_title(&text), format!("{}...", "ü".repeat(50)));
    }

    #[test]
    fn chat_request_defaults() {
        let req: ChatRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert_eq!(req.model, DEFAULT_MODEL);
        assert!(req.image.is_none());

        let req: ChatRequest =
            serde_json::from_str(r#"{"message":"hi","image":{"base64_data":"aGk="}}"#).unwrap();
        assert_eq!(req.image.unwrap().media_type, "image/png");
    }

    #[test]
    fn role_round_trips_through_storage_form() {
        for role in [MessageRole::User, MessageRole::Assistant, MessageRole::System] {
            assert_eq!(MessageRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(MessageRole::parse("tool"), None);
    }
}
