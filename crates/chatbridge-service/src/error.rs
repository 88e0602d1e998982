//! Service-layer error types.
//!
//! `ServiceError` is transport-agnostic. The HTTP crate maps it to status
//! codes and JSON error bodies.

/// Failure talking to the upstream LLM gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The request did not complete within the client timeout.
    #[error("Request to OpenRouter timed out. Please try again.")]
    Timeout,

    /// Connection, TLS or protocol failure before a response arrived.
    #[error("HTTP error communicating with OpenRouter: {0}")]
    Transport(String),

    /// The gateway answered with a non-success status.
    #[error("OpenRouter API error: {message}")]
    Status { status: u16, message: String },

    /// The gateway answered 200 but without any completion choice.
    #[error("No response choices returned from OpenRouter")]
    EmptyResponse,

    /// The response body could not be decoded.
    #[error("invalid response from OpenRouter: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Transport(_) => "transport",
            Self::Status { .. } => "status",
            Self::EmptyResponse => "empty_response",
            Self::Decode(_) => "decode",
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Service error shared across all transports.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Request content failed validation (empty message, bad image data).
    #[error("{0}")]
    Validation(String),

    /// Chat session does not exist.
    #[error("Session not found")]
    SessionNotFound,

    /// Upstream LLM gateway failure.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Database failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Short label used for the `errors_total` metric.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::SessionNotFound => "not_found",
            Self::Gateway(_) => "gateway",
            Self::Storage(_) => "storage",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
