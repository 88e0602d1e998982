//! HTTP application state: wraps `ServiceState` with HTTP-specific fields.
//!
//! `AppState` provides transparent access to all `ServiceState` methods
//! via `Deref`, and adds transport-specific config like CORS origins.

use std::ops::Deref;
use std::sync::Arc;

use chatbridge_service::ServiceState;

/// Shared HTTP application state, cloneable across handlers.
///
/// Wraps `ServiceState` (business logic) and adds HTTP-specific fields.
/// All `ServiceState` methods are available directly via `Deref`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppInner>,
}

struct AppInner {
    service: ServiceState,
    cors_origins: Vec<String>,
}

impl Deref for AppState {
    type Target = ServiceState;

    fn deref(&self) -> &ServiceState {
        &self.inner.service
    }
}

impl AppState {
    /// Creates a new HTTP application state.
    pub fn new(service: ServiceState, cors_origins: Vec<String>) -> Self {
        Self {
            inner: Arc::new(AppInner {
                service,
                cors_origins,
            }),
        }
    }

    /// Returns the configured CORS allowed origins.
    pub fn cors_origins(&self) -> &[String] {
        &self.inner.cors_origins
    }

    /// Returns a reference to the underlying service state.
    pub fn service(&self) -> &ServiceState {
        &self.inner.service
    }
}
