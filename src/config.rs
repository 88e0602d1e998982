//! Server configuration via CLI args and environment variables.

use std::time::Duration;

use chatbridge_service::ServiceConfig;
use chatbridge_service::gateway::{DEFAULT_BASE_URL, GatewayConfig};
use chatbridge_service::rate_limit::{DEFAULT_EXEMPT_PATHS, RateLimitConfig};
use clap::Parser;

/// Chat backend that relays conversations to OpenRouter models.
#[derive(Parser, Debug, Clone)]
#[command(name = "chatbridge-server", version, about)]
pub struct Config {
    /// Bind address.
    #[arg(long, default_value = "0.0.0.0", env = "CHATBRIDGE_HOST")]
    pub host: String,

    /// Bind port.
    #[arg(long, default_value_t = 8000, env = "CHATBRIDGE_PORT")]
    pub port: u16,

    /// SQLite database URL. Use `sqlite::memory:` for an ephemeral store.
    #[arg(long, default_value = "sqlite://chatbridge.db", env = "CHATBRIDGE_DATABASE_URL")]
    pub database_url: String,

    /// OpenRouter API key.
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true, default_value = "")]
    pub openrouter_api_key: String,

    /// OpenRouter API base URL.
    #[arg(long, default_value = DEFAULT_BASE_URL, env = "CHATBRIDGE_OPENROUTER_BASE_URL")]
    pub openrouter_base_url: String,

    /// Chat completion timeout in seconds.
    #[arg(long, default_value_t = 120, env = "CHATBRIDGE_CHAT_TIMEOUT")]
    pub chat_timeout: u64,

    /// Model listing timeout in seconds.
    #[arg(long, default_value_t = 30, env = "CHATBRIDGE_MODELS_TIMEOUT")]
    pub models_timeout: u64,

    /// Application name, reported by `/` and `/health` and sent as `X-Title`.
    #[arg(long, default_value = "chatbridge", env = "CHATBRIDGE_APP_NAME")]
    pub app_name: String,

    /// Value of the `HTTP-Referer` header sent upstream.
    #[arg(long, default_value = "http://localhost:8000", env = "CHATBRIDGE_REFERER")]
    pub referer: String,

    /// CORS allowed origins (comma-separated). Empty for no CORS.
    #[arg(long, env = "CHATBRIDGE_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    /// Log level.
    #[arg(long, default_value = "info", env = "CHATBRIDGE_LOG_LEVEL")]
    pub log_level: String,

    /// Log format: "text" or "json".
    #[arg(long, default_value = "text", env = "CHATBRIDGE_LOG_FORMAT")]
    pub log_format: String,

    /// Turn rate limiting off.
    #[arg(long, env = "CHATBRIDGE_RATE_LIMIT_DISABLED")]
    pub rate_limit_disabled: bool,

    /// General requests per minute, per client.
    #[arg(long, default_value_t = 60, env = "CHATBRIDGE_RATE_LIMIT_PER_MINUTE")]
    pub rate_limit_per_minute: u32,

    /// General requests per hour, per client.
    #[arg(long, default_value_t = 500, env = "CHATBRIDGE_RATE_LIMIT_PER_HOUR")]
    pub rate_limit_per_hour: u32,

    /// Chat requests per minute, per client.
    #[arg(long, default_value_t = 20, env = "CHATBRIDGE_CHAT_RATE_LIMIT_PER_MINUTE")]
    pub chat_rate_limit_per_minute: u32,

    /// Chat requests per hour, per client.
    #[arg(long, default_value_t = 200, env = "CHATBRIDGE_CHAT_RATE_LIMIT_PER_HOUR")]
    pub chat_rate_limit_per_hour: u32,

    /// Maximum requests within one second, per client.
    #[arg(long, default_value_t = 10, env = "CHATBRIDGE_RATE_LIMIT_BURST")]
    pub rate_limit_burst: u32,

    /// Paths exempt from rate limiting (comma-separated).
    #[arg(
        long,
        env = "CHATBRIDGE_RATE_LIMIT_EXEMPT_PATHS",
        value_delimiter = ',',
        default_values_t = DEFAULT_EXEMPT_PATHS.map(String::from)
    )]
    pub rate_limit_exempt_paths: Vec<String>,
}

impl Config {
    /// Parses configuration from CLI args and env vars.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Service-layer configuration derived from these settings.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            database_url: self.database_url.clone(),
            app_name: self.app_name.clone(),
            gateway: GatewayConfig {
                api_key: self.openrouter_api_key.clone(),
                base_url: self.openrouter_base_url.clone(),
                chat_timeout: Duration::from_secs(self.chat_timeout),
                models_timeout: Duration::from_secs(self.models_timeout),
                app_name: self.app_name.clone(),
                referer: self.referer.clone(),
            },
            rate_limit: RateLimitConfig {
                enabled: !self.rate_limit_disabled,
                requests_per_minute: self.rate_limit_per_minute,
                requests_per_hour: self.rate_limit_per_hour,
                chat_requests_per_minute: self.chat_rate_limit_per_minute,
                chat_requests_per_hour: self.chat_rate_limit_per_hour,
                max_burst: self.rate_limit_burst,
                exempt_paths: self.rate_limit_exempt_paths.clone(),
            },
        }
    }
}
