//! Shared helper functions for route handlers.

use uuid::Uuid;

use crate::error::ApiError;

/// Longest title a session may carry.
pub const MAX_TITLE_LEN: usize = 255;

/// Parses an optional `session_id` query value. Empty counts as absent.
pub fn parse_session_id(raw: Option<&str>) -> Result<Option<Uuid>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => Uuid::parse_str(s)
            .map(Some)
            .map_err(|_| ApiError::invalid_session_id()),
    }
}

/// Parses a session id taken from the URL path.
pub fn parse_path_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::invalid_session_id())
}

/// Validates a user-supplied title.
pub fn validate_title(title: Option<&str>) -> Result<String, ApiError> {
    let title = title.map(str::trim).unwrap_or_default();
    if title.is_empty() {
        return Err(ApiError::Validation("Title must not be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ApiError::Validation(format!(
            "Title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(title.to_string())
}
