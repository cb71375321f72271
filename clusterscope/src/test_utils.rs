//! Helpers for tests that drive a full [`crate::Application`].

use axum_test::TestServer;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::{Config, ProbesConfig, SnapshotConfig, UpstreamConfig};

/// Configuration pointing every upstream call at `upstream`, with both schedules disabled so
/// tests decide when probes and polls run.
pub fn create_test_config(upstream: &MockServer) -> Config {
    Config {
        upstream: UpstreamConfig {
            origin: Url::parse(&upstream.uri()).expect("mock server URI is a valid URL"),
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        },
        probes: ProbesConfig {
            enabled: false,
            interval: Duration::from_secs(3600),
            timeout: Duration::from_secs(2),
            ..Default::default()
        },
        snapshot: SnapshotConfig {
            enabled: false,
            interval: Duration::from_secs(3600),
            timeout: Duration::from_secs(2),
            aggregator_url: None,
        },
        enable_metrics: false,
        ..Default::default()
    }
}

pub async fn create_test_app(config: Config) -> (TestServer, crate::BackgroundServices) {
    crate::Application::new(config)
        .await
        .expect("Failed to create application")
        .into_test_server()
}

/// Answer `/{service}/health/ping` with 200 and `/{service}/health/db` with an UP body reporting 5ms.
pub async fn mount_healthy_service(upstream: &MockServer, service: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/{service}/health/ping")))
        .respond_with(ResponseTemplate::new(200))
        .mount(upstream)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/{service}/health/db")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "UP", "latency_ms": 5})))
        .mount(upstream)
        .await;
}

/// Answer the aggregator's health endpoint under the default `/community-service` base.
pub async fn mount_snapshot(upstream: &MockServer, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/community-service/diagnostics/health"))
        .respond_with(response)
        .mount(upstream)
        .await;
}
