//! HTTP middleware: rate limiting, request ID tracking, request metrics.

pub mod metrics;
pub mod rate_limit;
pub mod request_id;
