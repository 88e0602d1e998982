//! HTTP request accounting for the Prometheus endpoint.

use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::state::AppState;

/// Counts every response by method and status and accumulates latency.
pub async fn track_requests(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let started = Instant::now();
    let response = next.run(req).await;
    state.metrics().record_http_request(
        method.as_str(),
        response.status().as_u16(),
        started.elapsed(),
    );
    response
}
