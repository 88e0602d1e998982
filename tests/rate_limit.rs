//! Rate limiting through the full HTTP stack.

mod common;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chatbridge_service::rate_limit::RateLimitConfig;
use reqwest::Client;
use serde_json::{Value, json};

use common::{service_config, spawn_server_with, spawn_upstream};

/// Sleeps past the next minute boundary when it is only a few seconds
/// away, so a test's requests all land in one minute window.
async fn wait_for_fresh_minute() {
    let second = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
        % 60;
    if second >= 55 {
        tokio::time::sleep(Duration::from_secs(61 - second)).await;
    }
}

async fn spawn_limited(limits: RateLimitConfig) -> String {
    let upstream = spawn_upstream(true).await;
    let mut config = service_config(&upstream);
    config.rate_limit = limits;
    let base = spawn_server_with(&config).await.0;
    wait_for_fresh_minute().await;
    base
}

#[tokio::test]
async fn minute_limit_returns_429_with_headers() {
    let base = spawn_limited(RateLimitConfig {
        requests_per_minute: 2,
        max_burst: 100,
        ..RateLimitConfig::default()
    })
    .await;
    let client = Client::new();

    for expected_remaining in ["1", "0"] {
        let resp = client
            .get(format!("{base}/api/chat/sessions"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["x-ratelimit-limit-minute"], "2");
        assert_eq!(resp.headers()["x-ratelimit-remaining-minute"], expected_remaining);
        assert_eq!(resp.headers()["x-ratelimit-limit-hour"], "500");
    }

    let resp = client
        .get(format!("{base}/api/chat/sessions"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
    let retry_after: u64 = resp.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
    assert_eq!(resp.headers()["x-ratelimit-remaining-minute"], "0");

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "rate_limit_exceeded");
    assert_eq!(body["type"], "TooManyRequests");
    assert_eq!(
        body["detail"],
        "Rate limit exceeded. Max 2 requests per minute."
    );

    // The denial is counted.
    let metrics = client
        .get(format!("{base}/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("chatbridge_rate_limited_total{reason=\"minute\"} 1"));
    assert!(metrics.contains("chatbridge_rate_limit_clients 1"));
}

#[tokio::test]
async fn burst_limit_applies_first() {
    let base = spawn_limited(RateLimitConfig {
        max_burst: 1,
        ..RateLimitConfig::default()
    })
    .await;
    let client = Client::new();

    // Retry until two requests land in the same second.
    let mut denied = None;
    for _ in 0..20 {
        let resp = client
            .get(format!("{base}/api/models"))
            .send()
            .await
            .unwrap();
        if resp.status() == 429 {
            denied = Some(resp);
            break;
        }
    }
    let resp = denied.expect("burst limit never triggered");
    assert_eq!(resp.headers()["retry-after"], "1");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["detail"], "Burst limit exceeded. Please slow down.");
}

#[tokio::test]
async fn exempt_paths_are_never_limited() {
    let base = spawn_limited(RateLimitConfig {
        requests_per_minute: 1,
        max_burst: 1,
        ..RateLimitConfig::default()
    })
    .await;
    let client = Client::new();

    for _ in 0..5 {
        for path in ["/health", "/metrics", "/api/openapi.json"] {
            let resp = client.get(format!("{base}{path}")).send().await.unwrap();
            assert_eq!(resp.status(), 200, "{path}");
            assert!(resp.headers().get("x-ratelimit-limit-minute").is_none());
        }
    }
}

#[tokio::test]
async fn chat_sends_use_chat_ceilings() {
    let base = spawn_limited(RateLimitConfig {
        requests_per_minute: 50,
        chat_requests_per_minute: 1,
        max_burst: 100,
        ..RateLimitConfig::default()
    })
    .await;
    let client = Client::new();

    let resp = client
        .post(format!("{base}/api/chat"))
        .json(&json!({ "message": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-ratelimit-limit-minute"], "1");
    assert_eq!(resp.headers()["x-ratelimit-limit-hour"], "200");

    // Session management under /api/chat/ stays on the general ceilings.
    let resp = client
        .get(format!("{base}/api/chat/sessions"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-ratelimit-limit-minute"], "50");

    let resp = client
        .post(format!("{base}/api/chat"))
        .json(&json!({ "message": "again" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
}

#[tokio::test]
async fn forwarded_clients_are_counted_separately() {
    let base = spawn_limited(RateLimitConfig {
        requests_per_minute: 1,
        max_burst: 100,
        ..RateLimitConfig::default()
    })
    .await;
    let client = Client::new();

    for ip in ["203.0.113.1", "203.0.113.2"] {
        let resp = client
            .get(format!("{base}/api/models"))
            .header("x-forwarded-for", ip)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200, "{ip}");
    }

    let resp = client
        .get(format!("{base}/api/models"))
        .header("x-forwarded-for", "203.0.113.1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
}
