//! chatbridge HTTP: REST API transport adapter for the chatbridge server.
//!
//! Provides the HTTP/REST interface including:
//! - Chat endpoints (send, history, clear, new session)
//! - Session management (list, switch, rename, delete, stats)
//! - Model listing
//! - System, health and Prometheus metrics endpoints
//! - OpenAPI/Swagger UI
//! - Rate limiting, request-ID and request-metrics middleware

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;

use axum::Router;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use error::ErrorBody;

pub use state::AppState;

// ---------------------------------------------------------------------------
// OpenAPI
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    info(
        title = "chatbridge API",
        description = "Chat backend that relays conversations to OpenRouter models.\n\nSessions and messages are persisted; every non-exempt route is rate limited per client.",
        version = "0.3.2",
        license(name = "Apache-2.0"),
    ),
    paths(
        routes::system::root,
        routes::system::health,
        routes::chat::send_message,
        routes::chat::history,
        routes::chat::clear,
        routes::chat::new_session,
        routes::sessions::list_sessions,
        routes::sessions::switch_session,
        routes::sessions::delete_session,
        routes::sessions::update_session,
        routes::sessions::session_stats,
        routes::models::list_models,
    ),
    components(
        schemas(
            ErrorBody, types::ChatRequest, types::ImageData, types::ChatMessage,
            types::MessageRole, types::ChatResponse, types::HistoryResponse,
            types::ClearResponse, types::NewSessionResponse, types::SessionListResponse,
            types::SessionSummary, types::SwitchSessionResponse, types::DeleteSessionResponse,
            types::UpdateSessionResponse, types::SessionStats, types::ModelInfo,
            types::ModelsResponse, types::HealthResponse, types::RootResponse,
        )
    ),
    tags(
        (name = "Chat", description = "Send messages and manage the conversation history"),
        (name = "Sessions", description = "Chat session management"),
        (name = "Models", description = "Available models"),
        (name = "System", description = "System and health endpoints"),
    )
)]
struct ApiDoc;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Builds the HTTP API router.
///
/// Call this from the binary crate to get a fully-wired axum `Router`.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        // Chat
        .route("/api/chat", post(routes::chat::send_message))
        .route("/api/chat/history", get(routes::chat::history))
        .route("/api/chat/clear", post(routes::chat::clear))
        .route("/api/chat/new-session", post(routes::chat::new_session))
        // Sessions
        .route("/api/chat/sessions", get(routes::sessions::list_sessions))
        .route(
            "/api/chat/sessions/{session_id}",
            axum::routing::delete(routes::sessions::delete_session)
                .patch(routes::sessions::update_session),
        )
        .route(
            "/api/chat/sessions/{session_id}/switch",
            post(routes::sessions::switch_session),
        )
        .route(
            "/api/chat/sessions/{session_id}/stats",
            get(routes::sessions::session_stats),
        )
        // Models
        .route("/api/models", get(routes::models::list_models))
        // System
        .route("/", get(routes::system::root))
        .route("/health", get(routes::system::health))
        .route("/metrics", get(routes::system::metrics_endpoint))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http());

    let api = api
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::metrics::track_requests,
        ))
        .layer(axum::middleware::from_fn(
            middleware::request_id::request_id_middleware,
        ))
        .layer(cors_layer(&state))
        .with_state(state);

    api.merge(SwaggerUi::new("/api/docs").url("/api/openapi.json", ApiDoc::openapi()))
}

/// Serve the HTTP router on the given listener with graceful shutdown.
///
/// Wraps `axum::serve` with `ConnectInfo<SocketAddr>` so rate limiting
/// and logging can extract client addresses.
pub async fn serve(
    listener: tokio::net::TcpListener,
    app: Router,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let origins = state.cors_origins();

    // No origins configured → no CORS headers (deny cross-origin by default).
    if origins.is_empty() {
        return CorsLayer::new();
    }

    let x_request_id = middleware::request_id::X_REQUEST_ID.clone();
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE, x_request_id.clone()])
        .expose_headers([
            x_request_id,
            axum::http::header::RETRY_AFTER,
            axum::http::header::HeaderName::from_static("x-ratelimit-remaining-minute"),
            axum::http::header::HeaderName::from_static("x-ratelimit-remaining-hour"),
        ]);

    if origins.len() == 1 && origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard origin, all cross-origin requests allowed");
        base.allow_origin(tower_http::cors::Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        base.allow_origin(parsed)
    }
}
