//! chatbridge server entry point.

use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use chatbridge_server::config::Config;
use chatbridge_server::{AppState, ServiceState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    if config.openrouter_api_key.is_empty() {
        tracing::warn!("OPENROUTER_API_KEY is not set, chat requests will be rejected upstream");
    }

    let service = ServiceState::connect(&config.service_config()).await?;
    let state = AppState::new(service.clone(), config.cors_origins.clone());

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        database = %config.database_url,
        rate_limit = service.rate_limiter().is_enabled(),
        "chatbridge starting",
    );

    let app = chatbridge_server::router(state);

    let addr = SocketAddr::new(config.host.parse()?, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(%addr, "chatbridge ready");

    chatbridge_server::serve(listener, app, shutdown_signal()).await?;

    service.shutdown().await;
    tracing::info!("chatbridge shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install signal handler: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
