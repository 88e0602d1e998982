//! System and health endpoints.

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::error::ApiError;
use crate::state::AppState;
use crate::types::{HealthResponse, RootResponse};

/// API welcome document.
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = RootResponse),
    ),
    tag = "System"
)]
pub async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        message: format!("Welcome to {}", state.app_name()),
        version: env!("CARGO_PKG_VERSION").to_string(),
        docs: "/api/docs".to_string(),
        health: "/health".to_string(),
        metrics: "/metrics".to_string(),
    })
}

/// Check server health.
///
/// Returns server status, version, uptime and stored session/message counts.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Server is healthy", body = HealthResponse),
    ),
    tag = "System"
)]
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let store = state.history().store();
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.app_name().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_secs(),
        sessions: store.count_sessions().await?,
        messages: store.count_messages().await?,
    }))
}

/// Prometheus-compatible metrics endpoint.
pub async fn metrics_endpoint(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let body = state.render_metrics().await?;
    Ok((
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    ))
}
