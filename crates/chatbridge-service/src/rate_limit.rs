//! Per-client rate limiting over second, minute and hour buckets.
//!
//! Transport-agnostic core. The HTTP crate extracts the client identifier,
//! classifies the request and calls `check()`.
//!
//! Each client keeps a counter per wall-clock bucket at three granularities.
//! Only the current and the immediately preceding bucket survive a cleanup
//! pass, which runs from inside `check()` at most once a minute.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

const CLEANUP_INTERVAL_SECS: u64 = 60;

/// Paths that bypass the limiter unless configured otherwise.
pub const DEFAULT_EXEMPT_PATHS: [&str; 4] = ["/health", "/metrics", "/api/docs", "/api/openapi.json"];

/// Rate limiter settings. Immutable once the limiter is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// When false every check admits.
    pub enabled: bool,
    /// General traffic ceiling per 60 s window.
    pub requests_per_minute: u32,
    /// General traffic ceiling per 3600 s window.
    pub requests_per_hour: u32,
    /// Ceiling per minute for chat-send requests.
    pub chat_requests_per_minute: u32,
    /// Ceiling per hour for chat-send requests.
    pub chat_requests_per_hour: u32,
    /// Ceiling on requests within one wall-clock second.
    pub max_burst: u32,
    /// Exact request paths that skip the limiter entirely.
    pub exempt_paths: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 60,
            requests_per_hour: 500,
            chat_requests_per_minute: 20,
            chat_requests_per_hour: 200,
            max_burst: 10,
            exempt_paths: DEFAULT_EXEMPT_PATHS.iter().map(|p| (*p).to_string()).collect(),
        }
    }
}

impl RateLimitConfig {
    /// Returns true if `path` is listed as exempt.
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.iter().any(|p| p == path)
    }

    /// Minute and hour ceilings for the given request class.
    fn ceilings(&self, is_chat: bool) -> (u32, u32) {
        if is_chat {
            (self.chat_requests_per_minute, self.chat_requests_per_hour)
        } else {
            (self.requests_per_minute, self.requests_per_hour)
        }
    }
}

/// Which ceiling rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Burst,
    Minute,
    Hour,
}

impl LimitKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Burst => "burst",
            Self::Minute => "minute",
            Self::Hour => "hour",
        }
    }

    /// Seconds until the bucket that rejected the request rolls over.
    fn retry_after(self, now_secs: u64) -> u64 {
        match self {
            Self::Burst => 1,
            Self::Minute => 60 - now_secs % 60,
            Self::Hour => 3600 - now_secs % 3600,
        }
    }
}

/// Informational values exposed as `X-RateLimit-*` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub minute_limit: u32,
    pub minute_remaining: u32,
    pub hour_limit: u32,
    pub hour_remaining: u32,
    /// Set only when the request was denied.
    pub retry_after: Option<u64>,
}

/// Outcome of a single `check()`.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Human-readable denial reason; empty when allowed.
    pub reason: String,
    /// The ceiling that denied the request.
    pub exceeded: Option<LimitKind>,
    pub info: RateLimitInfo,
}

/// Bucket granularities, indexed into `ClientWindows::buckets`.
const GRANULARITY_SECS: [u64; 3] = [1, 60, 3600];

fn bucket_keys(now_secs: u64) -> [u64; 3] {
    GRANULARITY_SECS.map(|g| now_secs / g)
}

/// Per-client counters: `[second, minute, hour]` bucket → count.
#[derive(Default)]
struct ClientWindows {
    buckets: [BTreeMap<u64, u32>; 3],
}

impl ClientWindows {
    fn counts(&self, keys: &[u64; 3]) -> [u32; 3] {
        std::array::from_fn(|i| self.buckets[i].get(&keys[i]).copied().unwrap_or(0))
    }

    fn increment(&mut self, keys: &[u64; 3]) {
        for (map, key) in self.buckets.iter_mut().zip(keys) {
            *map.entry(*key).or_insert(0) += 1;
        }
    }

    /// Keeps only the current and previous bucket at each granularity.
    fn prune(&mut self, keys: &[u64; 3]) {
        for (map, key) in self.buckets.iter_mut().zip(keys) {
            let oldest_kept = key.saturating_sub(1);
            map.retain(|k, _| *k >= oldest_kept);
        }
    }

    fn is_empty(&self) -> bool {
        self.buckets.iter().all(BTreeMap::is_empty)
    }

    fn bucket_counts(&self) -> [usize; 3] {
        std::array::from_fn(|i| self.buckets[i].len())
    }
}

/// In-memory per-client rate limiter, cheap to clone.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<RateLimiterInner>,
}

struct RateLimiterInner {
    config: RateLimitConfig,
    clients: DashMap<String, ClientWindows>,
    /// Epoch seconds of the last cleanup pass.
    last_cleanup: AtomicU64,
}

impl RateLimiter {
    /// Creates a limiter with the given settings.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            inner: Arc::new(RateLimiterInner {
                config,
                clients: DashMap::new(),
                last_cleanup: AtomicU64::new(0),
            }),
        }
    }

    /// Creates a limiter that admits everything.
    pub fn disabled() -> Self {
        Self::new(RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        })
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.inner.config
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.config.enabled
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.inner.config.is_exempt(path)
    }

    /// Checks and, if admitted, records a request at the current wall-clock time.
    pub fn check(&self, client_id: &str, is_chat: bool) -> RateLimitDecision {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        self.check_at(client_id, is_chat, now)
    }

    /// Same as `check()` with an explicit time since the Unix epoch.
    ///
    /// The read of the current counts and the increment happen under the
    /// client's map entry lock, so concurrent requests from one client
    /// cannot both slip past a ceiling.
    pub fn check_at(&self, client_id: &str, is_chat: bool, now: Duration) -> RateLimitDecision {
        let config = &self.inner.config;
        let (minute_limit, hour_limit) = config.ceilings(is_chat);

        if !config.enabled {
            return RateLimitDecision {
                allowed: true,
                reason: String::new(),
                exceeded: None,
                info: RateLimitInfo {
                    minute_limit,
                    minute_remaining: minute_limit,
                    hour_limit,
                    hour_remaining: hour_limit,
                    retry_after: None,
                },
            };
        }

        let now_secs = now.as_secs();
        self.maybe_cleanup(now_secs);

        let keys = bucket_keys(now_secs);
        let mut windows = self.inner.clients.entry(client_id.to_owned()).or_default();
        let [second_count, minute_count, hour_count] = windows.counts(&keys);

        let mut info = RateLimitInfo {
            minute_limit,
            minute_remaining: minute_limit.saturating_sub(minute_count).saturating_sub(1),
            hour_limit,
            hour_remaining: hour_limit.saturating_sub(hour_count).saturating_sub(1),
            retry_after: None,
        };

        let exceeded = if second_count >= config.max_burst {
            Some(LimitKind::Burst)
        } else if minute_count >= minute_limit {
            Some(LimitKind::Minute)
        } else if hour_count >= hour_limit {
            Some(LimitKind::Hour)
        } else {
            None
        };

        let Some(kind) = exceeded else {
            windows.increment(&keys);
            return RateLimitDecision {
                allowed: true,
                reason: String::new(),
                exceeded: None,
                info,
            };
        };
        drop(windows);

        info.retry_after = Some(kind.retry_after(now_secs));
        let reason = match kind {
            LimitKind::Burst => "Burst limit exceeded. Please slow down.".to_string(),
            LimitKind::Minute => {
                format!("Rate limit exceeded. Max {minute_limit} requests per minute.")
            }
            LimitKind::Hour => {
                format!("Hourly rate limit exceeded. Max {hour_limit} requests per hour.")
            }
        };

        RateLimitDecision {
            allowed: false,
            reason,
            exceeded: Some(kind),
            info,
        }
    }

    /// Runs a cleanup pass if the last one is at least a minute old.
    /// Only the caller that wins the timestamp swap does the work.
    fn maybe_cleanup(&self, now_secs: u64) {
        let last = self.inner.last_cleanup.load(Ordering::Acquire);
        if now_secs.saturating_sub(last) < CLEANUP_INTERVAL_SECS {
            return;
        }
        if self
            .inner
            .last_cleanup
            .compare_exchange(last, now_secs, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.cleanup_at(Duration::from_secs(now_secs));
    }

    /// Drops buckets older than the previous one at each granularity and
    /// forgets clients with nothing left.
    pub fn cleanup_at(&self, now: Duration) {
        let keys = bucket_keys(now.as_secs());
        let before = self.inner.clients.len();
        self.inner.clients.retain(|_, windows| {
            windows.prune(&keys);
            !windows.is_empty()
        });
        let removed = before.saturating_sub(self.inner.clients.len());
        if removed > 0 {
            tracing::debug!(removed, "pruned idle rate limit clients");
        }
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.inner.clients.len()
    }

    /// Bucket counts `[second, minute, hour]` held for a client.
    pub fn bucket_counts(&self, client_id: &str) -> Option<[usize; 3]> {
        self.inner
            .clients
            .get(client_id)
            .map(|windows| windows.bucket_counts())
    }
}
