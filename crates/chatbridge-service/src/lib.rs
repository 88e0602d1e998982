//! chatbridge service: core business logic for the chatbridge server.
//!
//! This crate contains all transport-agnostic business logic:
//! chat persistence, the LLM gateway client, chat orchestration,
//! rate limiting and metrics.
//!
//! The transport crate (`chatbridge-http`) depends on this crate and
//! provides the protocol-specific adapter.
//!
//! **Zero transport dependencies**: no axum, no tower, no HTTP server code.

pub mod chat;
pub mod error;
pub mod gateway;
pub mod history;
pub mod metrics;
pub mod rate_limit;
pub mod storage;
pub mod types;

use std::sync::Arc;
use std::time::Instant;

use gateway::{ChatGateway, GatewayConfig, OpenRouterClient};
use history::ChatHistory;
use metrics::Metrics;
use rate_limit::{RateLimitConfig, RateLimiter};
use storage::ChatStore;

use crate::error::ServiceError;

/// Configuration subset relevant to the service layer.
///
/// Transport-specific config (ports, CORS origins, log format) stays in
/// the binary crate's `Config` struct.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub database_url: String,
    pub app_name: String,
    pub gateway: GatewayConfig,
    pub rate_limit: RateLimitConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://chatbridge.db".to_string(),
            app_name: "chatbridge".to_string(),
            gateway: GatewayConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Shared service state, cloneable across all transport handlers.
///
/// Wraps all business-layer components in an `Arc`. The transport crate
/// receives this and delegates all logic to it.
#[derive(Clone)]
pub struct ServiceState {
    inner: Arc<Inner>,
}

struct Inner {
    history: ChatHistory,
    gateway: Arc<dyn ChatGateway>,
    metrics: Metrics,
    rate_limiter: RateLimiter,
    app_name: String,
    start_time: Instant,
}

impl ServiceState {
    /// Connects the database and builds the OpenRouter client from config.
    pub async fn connect(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let gateway = Arc::new(OpenRouterClient::new(&config.gateway)?);
        Self::connect_with_gateway(config, gateway).await
    }

    /// Like [`connect`](Self::connect) with a caller-supplied gateway.
    pub async fn connect_with_gateway(
        config: &ServiceConfig,
        gateway: Arc<dyn ChatGateway>,
    ) -> Result<Self, ServiceError> {
        let store = ChatStore::connect(&config.database_url).await?;
        Ok(Self::from_parts(
            store,
            gateway,
            RateLimiter::new(config.rate_limit.clone()),
            config.app_name.clone(),
        ))
    }

    /// Creates an in-memory service state (for tests and ephemeral use).
    ///
    /// Rate limiting is disabled.
    pub async fn new_in_memory(gateway: Arc<dyn ChatGateway>) -> Result<Self, ServiceError> {
        Ok(Self::from_parts(
            ChatStore::in_memory().await?,
            gateway,
            RateLimiter::disabled(),
            "chatbridge".to_string(),
        ))
    }

    /// Creates an in-memory state with the given rate limits (for tests).
    pub async fn new_in_memory_with_rate_limit(
        gateway: Arc<dyn ChatGateway>,
        rate_limit: RateLimitConfig,
    ) -> Result<Self, ServiceError> {
        Ok(Self::from_parts(
            ChatStore::in_memory().await?,
            gateway,
            RateLimiter::new(rate_limit),
            "chatbridge".to_string(),
        ))
    }

    fn from_parts(
        store: ChatStore,
        gateway: Arc<dyn ChatGateway>,
        rate_limiter: RateLimiter,
        app_name: String,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                history: ChatHistory::new(store),
                gateway,
                metrics: Metrics::new(),
                rate_limiter,
                app_name,
                start_time: Instant::now(),
            }),
        }
    }

    // --- Accessors ---

    pub fn history(&self) -> &ChatHistory {
        &self.inner.history
    }

    pub fn gateway(&self) -> &dyn ChatGateway {
        self.inner.gateway.as_ref()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.rate_limiter
    }

    pub fn app_name(&self) -> &str {
        &self.inner.app_name
    }

    pub fn uptime_secs(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }

    // --- Maintenance ---

    /// Renders the Prometheus exposition, reading live gauges from storage.
    pub async fn render_metrics(&self) -> Result<String, ServiceError> {
        let store = self.inner.history.store();
        let sessions = store.count_sessions().await?;
        let messages = store.count_messages().await?;
        Ok(self.inner.metrics.render(
            sessions as u64,
            messages as u64,
            self.inner.rate_limiter.tracked_clients(),
            self.uptime_secs(),
        ))
    }

    /// Closes the database pool.
    pub async fn shutdown(&self) {
        self.inner.history.store().close().await;
    }
}
