//! Lightweight Prometheus-compatible metrics using atomic counters.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;

/// Upper bounds (seconds) of the chat latency histogram.
const CHAT_LATENCY_BUCKETS: [f64; 7] = [0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0];

/// Counter family keyed by a single label value.
struct LabeledCounter {
    label: &'static str,
    values: DashMap<String, u64>,
}

impl LabeledCounter {
    fn new(label: &'static str) -> Self {
        Self {
            label,
            values: DashMap::new(),
        }
    }

    fn inc(&self, value: &str) {
        self.add(value, 1);
    }

    fn add(&self, value: &str, n: u64) {
        *self.values.entry(value.to_owned()).or_insert(0) += n;
    }

    fn get(&self, value: &str) -> u64 {
        self.values.get(value).map_or(0, |v| *v)
    }

    /// Label values sorted so the exposition is stable between scrapes.
    fn snapshot(&self) -> Vec<(String, u64)> {
        let mut entries: Vec<(String, u64)> = self
            .values
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        entries.sort();
        entries
    }

    fn render(&self, out: &mut String, name: &str, help: &str) {
        writeln!(out, "# HELP {name} {help}").unwrap();
        writeln!(out, "# TYPE {name} counter").unwrap();
        for (value, count) in self.snapshot() {
            let label = self.label;
            let value = escape_label(&value);
            writeln!(out, "{name}{{{label}=\"{value}\"}} {count}").unwrap();
        }
    }
}

/// Fixed-bucket histogram; bucket counts are non-cumulative until rendered.
struct Histogram {
    buckets: [AtomicU64; CHAT_LATENCY_BUCKETS.len()],
    /// Accumulated duration stored as microseconds.
    sum_us: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    fn new() -> Self {
        Self {
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            sum_us: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    fn observe(&self, duration: Duration) {
        let secs = duration.as_secs_f64();
        if let Some(idx) = CHAT_LATENCY_BUCKETS.iter().position(|le| secs <= *le) {
            self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        }
        self.sum_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    fn render(&self, out: &mut String, name: &str, help: &str) {
        writeln!(out, "# HELP {name} {help}").unwrap();
        writeln!(out, "# TYPE {name} histogram").unwrap();
        let mut cumulative = 0;
        for (le, bucket) in CHAT_LATENCY_BUCKETS.iter().zip(&self.buckets) {
            cumulative += bucket.load(Ordering::Relaxed);
            writeln!(out, "{name}_bucket{{le=\"{le}\"}} {cumulative}").unwrap();
        }
        let count = self.count.load(Ordering::Relaxed);
        writeln!(out, "{name}_bucket{{le=\"+Inf\"}} {count}").unwrap();
        let secs = self.sum_us.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        writeln!(out, "{name}_sum {secs:.6}").unwrap();
        writeln!(out, "{name}_count {count}").unwrap();
    }
}

/// Application-wide metrics collected via atomic counters.
pub struct Metrics {
    http_requests: DashMap<(String, u16), u64>,
    /// Accumulated HTTP handling time stored as microseconds.
    http_duration_us_sum: AtomicU64,
    http_duration_count: AtomicU64,
    chat_requests: LabeledCounter,
    chat_latency: Histogram,
    messages: LabeledCounter,
    message_chars: LabeledCounter,
    model_usage: LabeledCounter,
    gateway_requests: LabeledCounter,
    rate_limited: LabeledCounter,
    errors: LabeledCounter,
    image_uploads: LabeledCounter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            http_requests: DashMap::new(),
            http_duration_us_sum: AtomicU64::new(0),
            http_duration_count: AtomicU64::new(0),
            chat_requests: LabeledCounter::new("status"),
            chat_latency: Histogram::new(),
            messages: LabeledCounter::new("role"),
            message_chars: LabeledCounter::new("role"),
            model_usage: LabeledCounter::new("model"),
            gateway_requests: LabeledCounter::new("status"),
            rate_limited: LabeledCounter::new("reason"),
            errors: LabeledCounter::new("type"),
            image_uploads: LabeledCounter::new("status"),
        }
    }

    /// Record a completed HTTP request.
    pub fn record_http_request(&self, method: &str, status: u16, duration: Duration) {
        *self
            .http_requests
            .entry((method.to_owned(), status))
            .or_insert(0) += 1;
        self.http_duration_us_sum
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.http_duration_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a chat round trip (`status` is `success` or `error`).
    pub fn record_chat_request(&self, model: &str, status: &str, duration: Duration) {
        self.chat_requests.inc(status);
        self.chat_latency.observe(duration);
        if status == "success" {
            self.model_usage.inc(model);
        }
    }

    /// Record a persisted message and its length in characters.
    pub fn record_message(&self, role: &str, chars: usize) {
        self.messages.inc(role);
        self.message_chars.add(role, chars as u64);
    }

    /// Record the outcome of an upstream gateway call.
    pub fn record_gateway_request(&self, status: &str) {
        self.gateway_requests.inc(status);
    }

    /// Record a request denied by the rate limiter.
    pub fn record_rate_limited(&self, reason: &str) {
        self.rate_limited.inc(reason);
    }

    /// Record an error by kind.
    pub fn record_error(&self, kind: &str) {
        self.errors.inc(kind);
    }

    /// Record an image attached to a chat request.
    pub fn record_image_upload(&self, status: &str) {
        self.image_uploads.inc(status);
    }

    pub fn chat_requests(&self, status: &str) -> u64 {
        self.chat_requests.get(status)
    }

    pub fn rate_limited(&self, reason: &str) -> u64 {
        self.rate_limited.get(reason)
    }

    pub fn errors(&self, kind: &str) -> u64 {
        self.errors.get(kind)
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(
        &self,
        sessions_total: u64,
        messages_total: u64,
        rate_limit_clients: usize,
        uptime_seconds: u64,
    ) -> String {
        let mut out = String::with_capacity(4096);

        // Gauges (live values)
        gauge(
            &mut out,
            "chatbridge_sessions_total",
            "Chat sessions stored",
            sessions_total,
        );
        gauge(
            &mut out,
            "chatbridge_stored_messages_total",
            "Messages stored across all sessions",
            messages_total,
        );
        gauge(
            &mut out,
            "chatbridge_rate_limit_clients",
            "Clients tracked by the rate limiter",
            rate_limit_clients,
        );
        gauge(
            &mut out,
            "chatbridge_uptime_seconds",
            "Server uptime in seconds",
            uptime_seconds,
        );

        // HTTP
        writeln!(
            out,
            "# HELP chatbridge_http_requests_total Total HTTP requests."
        )
        .unwrap();
        writeln!(out, "# TYPE chatbridge_http_requests_total counter").unwrap();
        let mut http: Vec<((String, u16), u64)> = self
            .http_requests
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        http.sort();
        for ((method, status), count) in http {
            writeln!(
                out,
                "chatbridge_http_requests_total{{method=\"{method}\",status=\"{status}\"}} {count}"
            )
            .unwrap();
        }

        let secs = self.http_duration_us_sum.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        writeln!(
            out,
            "# HELP chatbridge_http_request_duration_seconds_sum Total HTTP handling time in seconds."
        )
        .unwrap();
        writeln!(
            out,
            "# TYPE chatbridge_http_request_duration_seconds_sum counter"
        )
        .unwrap();
        writeln!(out, "chatbridge_http_request_duration_seconds_sum {secs:.6}").unwrap();
        writeln!(
            out,
            "# HELP chatbridge_http_request_duration_seconds_count Total number of timed HTTP requests."
        )
        .unwrap();
        writeln!(
            out,
            "# TYPE chatbridge_http_request_duration_seconds_count counter"
        )
        .unwrap();
        writeln!(
            out,
            "chatbridge_http_request_duration_seconds_count {}",
            self.http_duration_count.load(Ordering::Relaxed)
        )
        .unwrap();

        // Chat
        self.chat_requests.render(
            &mut out,
            "chatbridge_chat_requests_total",
            "Total chat requests.",
        );
        self.chat_latency.render(
            &mut out,
            "chatbridge_chat_request_duration_seconds",
            "Chat round trip latency in seconds.",
        );
        self.messages.render(
            &mut out,
            "chatbridge_messages_total",
            "Total messages persisted.",
        );
        self.message_chars.render(
            &mut out,
            "chatbridge_message_chars_total",
            "Total message length in characters.",
        );
        self.model_usage.render(
            &mut out,
            "chatbridge_model_usage_total",
            "Successful completions per model.",
        );
        self.image_uploads.render(
            &mut out,
            "chatbridge_image_uploads_total",
            "Images attached to chat requests.",
        );

        // Upstream and protection
        self.gateway_requests.render(
            &mut out,
            "chatbridge_gateway_requests_total",
            "Calls to the LLM gateway.",
        );
        self.rate_limited.render(
            &mut out,
            "chatbridge_rate_limited_total",
            "Requests denied by the rate limiter.",
        );
        self.errors.render(
            &mut out,
            "chatbridge_errors_total",
            "Errors by type.",
        );

        out
    }
}

fn gauge(out: &mut String, name: &str, help: &str, value: impl std::fmt::Display) {
    writeln!(out, "# HELP {name} {help}").unwrap();
    writeln!(out, "# TYPE {name} gauge").unwrap();
    writeln!(out, "{name} {value}").unwrap();
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_gauges_and_counters() {
        let metrics = Metrics::new();
        metrics.record_http_request("GET", 200, Duration::from_millis(5));
        metrics.record_http_request("GET", 200, Duration::from_millis(5));
        metrics.record_http_request("POST", 429, Duration::from_millis(1));
        metrics.record_chat_request("test/model:free", "success", Duration::from_millis(700));
        metrics.record_message("user", 5);
        metrics.record_message("assistant", 12);
        metrics.record_rate_limited("minute");
        metrics.record_error("gateway");

        let out = metrics.render(3, 8, 2, 42);

        assert!(out.contains("chatbridge_sessions_total 3"));
        assert!(out.contains("chatbridge_stored_messages_total 8"));
        assert!(out.contains("chatbridge_uptime_seconds 42"));
        assert!(out.contains("chatbridge_http_requests_total{method=\"GET\",status=\"200\"} 2"));
        assert!(out.contains("chatbridge_http_requests_total{method=\"POST\",status=\"429\"} 1"));
        assert!(out.contains("chatbridge_chat_requests_total{status=\"success\"} 1"));
        assert!(out.contains("chatbridge_model_usage_total{model=\"test/model:free\"} 1"));
        assert!(out.contains("chatbridge_messages_total{role=\"assistant\"} 1"));
        assert!(out.contains("chatbridge_message_chars_total{role=\"assistant\"} 12"));
        assert!(out.contains("chatbridge_rate_limited_total{reason=\"minute\"} 1"));
        assert!(out.contains("chatbridge_errors_total{type=\"gateway\"} 1"));
        assert!(out.contains("# TYPE chatbridge_chat_request_duration_seconds histogram"));
    }

    #[test]
    fn histogram_buckets_are_cumulative() {
        let metrics = Metrics::new();
        metrics.record_chat_request("m", "success", Duration::from_millis(300));
        metrics.record_chat_request("m", "success", Duration::from_millis(1500));
        metrics.record_chat_request("m", "error", Duration::from_secs(90));

        let out = metrics.render(0, 0, 0, 0);
        assert!(out.contains("chatbridge_chat_request_duration_seconds_bucket{le=\"0.5\"} 1"));
        assert!(out.contains("chatbridge_chat_request_duration_seconds_bucket{le=\"2\"} 2"));
        assert!(out.contains("chatbridge_chat_request_duration_seconds_bucket{le=\"60\"} 2"));
        assert!(out.contains("chatbridge_chat_request_duration_seconds_bucket{le=\"+Inf\"} 3"));
        assert!(out.contains("chatbridge_chat_request_duration_seconds_count 3"));
        // Errors do not count as model usage.
        assert!(out.contains("chatbridge_model_usage_total{model=\"m\"} 2"));
    }

    #[test]
    fn label_values_are_escaped() {
        let metrics = Metrics::new();
        metrics.record_error("a\"b");
        let out = metrics.render(0, 0, 0, 0);
        assert!(out.contains("chatbridge_errors_total{type=\"a\\\"b\"} 1"));
    }
}
