//! Shared harness for the integration tests: a mock OpenRouter upstream and
//! helpers that boot chatbridge on an ephemeral port.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use chatbridge_server::config::Config;
use chatbridge_server::{AppState, ServiceConfig, ServiceState};
use clap::Parser;
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// Last user text the mock upstream received, or the text part of a
/// multimodal turn.
fn last_user_text(body: &Value) -> String {
    let Some(last) = body["messages"].as_array().and_then(|m| m.last()) else {
        return String::new();
    };
    match &last["content"] {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .find(|p| p["type"] == "text")
            .and_then(|p| p["text"].as_str())
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

/// Chat completions: echoes the last user turn. Messages containing
/// "explode" get a 500, messages containing "sleepy" stall for 3 s.
async fn completions(Json(body): Json<Value>) -> impl IntoResponse {
    let text = last_user_text(&body);
    if text.contains("explode") {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": { "message": "upstream exploded" } })),
        );
    }
    if text.contains("sleepy") {
        tokio::time::sleep(Duration::from_secs(3)).await;
    }
    let turns = body["messages"].as_array().map_or(0, Vec::len);
    let has_image = body["messages"]
        .as_array()
        .and_then(|m| m.last())
        .is_some_and(|m| m["content"].is_array());
    (
        StatusCode::OK,
        Json(json!({
            "id": "gen-1",
            "model": body["model"],
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": format!("Echo: {text} (turns={turns}, image={has_image})")
                }
            }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 7 }
        })),
    )
}

async fn models() -> Json<Value> {
    Json(json!({
        "data": [
            {
                "id": "acme/tiny-chat:free",
                "name": "Acme: Tiny Chat",
                "context_length": 8192,
                "pricing": { "prompt": "0", "completion": "0" },
                "architecture": { "modality": "text->text" }
            },
            {
                "id": "acme/vision-pro",
                "name": "Acme: Vision Pro",
                "pricing": { "prompt": "0", "completion": "0" },
                "architecture": { "input_modalities": ["text", "image"] }
            },
            {
                "id": "acme/premium",
                "name": "Acme: Premium",
                "pricing": { "prompt": "0.00001", "completion": "0.00003" }
            }
        ]
    }))
}

async fn broken_models() -> impl IntoResponse {
    (StatusCode::SERVICE_UNAVAILABLE, "down")
}

async fn spawn_router(app: axum::Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Boots the mock upstream. Returns its API base URL (ending in `/api/v1`).
pub async fn spawn_upstream(models_available: bool) -> String {
    let models_route = if models_available {
        get(models)
    } else {
        get(broken_models)
    };
    let app = axum::Router::new()
        .route("/api/v1/chat/completions", post(completions))
        .route("/api/v1/models", models_route);
    format!("{}/api/v1", spawn_router(app).await)
}

/// Service configuration pointing at `upstream`, with an in-memory
/// database and rate limiting off.
pub fn service_config(upstream: &str) -> ServiceConfig {
    let mut config = Config::try_parse_from([
        "chatbridge-server",
        "--database-url",
        "sqlite::memory:",
        "--openrouter-api-key",
        "test-key",
        "--openrouter-base-url",
        upstream,
        "--chat-timeout",
        "1",
        "--models-timeout",
        "1",
        "--rate-limit-disabled",
    ])
    .unwrap()
    .service_config();
    config.app_name = "chatbridge-test".to_string();
    config
}

/// Boots chatbridge with the given configuration.
/// Returns the base URL and the shared service state.
pub async fn spawn_server_with(config: &ServiceConfig) -> (String, ServiceState) {
    let service = ServiceState::connect(config).await.unwrap();
    let app = chatbridge_server::router(AppState::new(service.clone(), vec![]));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        chatbridge_server::serve(listener, app, std::future::pending())
            .await
            .unwrap();
    });

    (format!("http://{addr}"), service)
}

/// Boots chatbridge against a healthy mock upstream.
pub async fn spawn_server() -> String {
    let upstream = spawn_upstream(true).await;
    spawn_server_with(&service_config(&upstream)).await.0
}
