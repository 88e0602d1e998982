//! Per-client rate limiting middleware.
//!
//! Delegates the decision to `chatbridge_service::rate_limit::RateLimiter`
//! and translates it into `X-RateLimit-*` headers or a 429 response.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chatbridge_service::rate_limit::RateLimitInfo;

use crate::error::ApiError;
use crate::state::AppState;

static LIMIT_MINUTE: HeaderName = HeaderName::from_static("x-ratelimit-limit-minute");
static REMAINING_MINUTE: HeaderName = HeaderName::from_static("x-ratelimit-remaining-minute");
static LIMIT_HOUR: HeaderName = HeaderName::from_static("x-ratelimit-limit-hour");
static REMAINING_HOUR: HeaderName = HeaderName::from_static("x-ratelimit-remaining-hour");

/// Sub-paths under the chat prefix that are session management, not chat.
const NON_CHAT_SEGMENTS: [&str; 4] = ["/sessions", "/new-session", "/switch", "/clear"];

/// True for a chat-send request: `POST .../api/chat`.
pub fn is_chat_request(method: &Method, path: &str) -> bool {
    method == Method::POST
        && path.ends_with("/api/chat")
        && !NON_CHAT_SEGMENTS.iter().any(|seg| path.contains(seg))
}

/// Identifies the client: first `X-Forwarded-For` entry, then `X-Real-IP`,
/// then the peer address, else `"unknown"`.
pub fn client_id(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(xff) = headers.get("x-forwarded-for")
        && let Ok(s) = xff.to_str()
        && let Some(first) = s.split(',').next()
        && !first.trim().is_empty()
    {
        return first.trim().to_string();
    }

    if let Some(real_ip) = headers.get("x-real-ip")
        && let Ok(s) = real_ip.to_str()
        && !s.trim().is_empty()
    {
        return s.trim().to_string();
    }

    peer.map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string())
}

fn apply_headers(headers: &mut HeaderMap, info: &RateLimitInfo) {
    headers.insert(LIMIT_MINUTE.clone(), HeaderValue::from(info.minute_limit));
    headers.insert(
        REMAINING_MINUTE.clone(),
        HeaderValue::from(info.minute_remaining),
    );
    headers.insert(LIMIT_HOUR.clone(), HeaderValue::from(info.hour_limit));
    headers.insert(REMAINING_HOUR.clone(), HeaderValue::from(info.hour_remaining));
    if let Some(retry_after) = info.retry_after {
        headers.insert(
            axum::http::header::RETRY_AFTER,
            HeaderValue::from(retry_after),
        );
    }
}

/// Rate-limiting middleware. Returns 429 when a ceiling is exceeded.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let limiter = state.rate_limiter();
    let path = req.uri().path();
    if !limiter.is_enabled() || limiter.is_exempt(path) {
        return next.run(req).await;
    }

    let is_chat = is_chat_request(req.method(), path);
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let client = client_id(req.headers(), peer);
    let decision = limiter.check(&client, is_chat);

    if !decision.allowed {
        let kind = decision.exceeded.map_or("unknown", |k| k.label());
        state.metrics().record_rate_limited(kind);
        tracing::warn!(
            client = %client,
            path = %req.uri().path(),
            limit = kind,
            "rate limit exceeded"
        );
        let mut response = ApiError::TooManyRequests(decision.reason).into_response();
        apply_headers(response.headers_mut(), &decision.info);
        return response;
    }

    let mut response = next.run(req).await;
    apply_headers(response.headers_mut(), &decision.info);
    response
}
