//! chatbridge server: chat backend relaying conversations to OpenRouter.
//!
//! The business layer (storage, history, gateway, rate limiting, metrics)
//! lives in `chatbridge-service`; the REST transport in `chatbridge-http`.
//! This crate wires them together behind a CLI/env configuration.

pub mod config;

pub use chatbridge_http::{AppState, router, serve};
pub use chatbridge_service::{ServiceConfig, ServiceState};
