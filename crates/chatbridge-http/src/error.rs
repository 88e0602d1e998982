//! HTTP error mapping.
//!
//! `ApiError` converts service errors and extractor rejections into status
//! codes and a JSON body of the form `{error, detail, type}`.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chatbridge_service::error::ServiceError;
use serde::Serialize;
use utoipa::ToSchema;

/// API error returned by every handler.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed request parameter.
    #[error("{0}")]
    BadRequest(String),

    /// Well-formed request with invalid content.
    #[error("{0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Rate limit exceeded.
    #[error("{0}")]
    TooManyRequests(String),

    /// Upstream LLM gateway failure.
    #[error("{0}")]
    Gateway(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    /// Error code (e.g. "bad_request", "not_found", "rate_limit_exceeded").
    pub(crate) error: String,
    /// Human-readable error detail, if available.
    pub(crate) detail: Option<String>,
    /// Error class (e.g. "NotFound", "TooManyRequests").
    #[serde(rename = "type")]
    pub(crate) kind: String,
}

impl ApiError {
    pub fn invalid_session_id() -> Self {
        Self::BadRequest("Invalid session ID".to_string())
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => Self::Validation(msg),
            ServiceError::SessionNotFound => Self::NotFound("Session not found".to_string()),
            ServiceError::Gateway(e) => Self::Gateway(e.to_string()),
            ServiceError::Storage(msg) | ServiceError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, kind) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request", "BadRequest"),
            ApiError::Validation(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                "ValidationError",
            ),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", "NotFound"),
            ApiError::TooManyRequests(_) => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_exceeded",
                "TooManyRequests",
            ),
            ApiError::Gateway(msg) => {
                tracing::error!(%msg, "gateway error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "gateway_error",
                    "GatewayError",
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(%msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "InternalServerError",
                )
            }
        };

        let detail = match self {
            ApiError::BadRequest(msg)
            | ApiError::Validation(msg)
            | ApiError::NotFound(msg)
            | ApiError::TooManyRequests(msg)
            | ApiError::Gateway(msg)
            | ApiError::Internal(msg) => msg,
        };

        let body = ErrorBody {
            error: error.to_string(),
            detail: Some(detail),
            kind: kind.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}
