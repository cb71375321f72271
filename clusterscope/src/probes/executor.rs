//! Probe execution against a service's health endpoints.
//!
//! This module provides the `ProbeExecutor`, which issues the two per-service checks:
//! a liveness ping (`GET {base}/health/ping`, measured round trip) and a database health
//! check (`GET {base}/health/db`, latency as reported by the service). Both are bounded by
//! the probe timeout and abort when the scheduler shuts down.

use reqwest::Client;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::models::{DbHealthBody, ProbeTarget};
use crate::outbound::{self, CallError};

/// Executes health checks against service endpoints.
#[derive(Clone)]
pub struct ProbeExecutor {
    client: Client,
    timeout: Duration,
}

impl ProbeExecutor {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Ping the service. Any 2xx counts as alive; returns the elapsed wall time in whole milliseconds.
    #[instrument(skip_all, fields(service = %target.name))]
    pub async fn ping(&self, target: &ProbeTarget, token: &CancellationToken) -> Result<i64, CallError> {
        let url = target.ping_url();
        let start = Instant::now();

        let result = outbound::bounded(self.timeout, token, async {
            let response = self.client.get(&url).send().await?;
            if !response.status().is_success() {
                return Err(CallError::Status(response.status()));
            }
            Ok(())
        })
        .await;

        let elapsed_ms = (start.elapsed().as_secs_f64() * 1000.0).round() as i64;
        match result {
            Ok(()) => Ok(elapsed_ms),
            Err(e) => {
                debug!("Ping {} failed after {}ms: {}", url, elapsed_ms, e);
                Err(e)
            }
        }
    }

    /// Check the service's database. Succeeds only on a 2xx JSON body whose `status` is exactly "UP".
    #[instrument(skip_all, fields(service = %target.name))]
    pub async fn db_health(&self, target: &ProbeTarget, token: &CancellationToken) -> Result<i64, CallError> {
        let url = target.db_url();

        let result = outbound::bounded(self.timeout, token, async {
            let response = self.client.get(&url).send().await?;
            if !response.status().is_success() {
                return Err(CallError::Status(response.status()));
            }
            response.json::<DbHealthBody>().await.map_err(|e| CallError::Decode(e.to_string()))
        })
        .await;

        let body = result.inspect_err(|e| debug!("DB health {} failed: {}", url, e))?;
        match body.status.as_deref() {
            Some("UP") => Ok(body.reported_latency_ms()),
            other => {
                let reported = other.unwrap_or("<missing>").to_string();
                debug!("DB health {} reported {}", url, reported);
                Err(CallError::Unhealthy(reported))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup() -> (MockServer, ProbeExecutor, ProbeTarget) {
        let server = MockServer::start().await;
        let executor = ProbeExecutor::new(outbound::build_client(10).unwrap(), Duration::from_millis(300));
        let target = ProbeTarget {
            name: "auth-service".to_string(),
            base_url: format!("{}/auth-service", server.uri()),
        };
        (server, executor, target)
    }

    async fn db_returns(server: &MockServer, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path("/auth-service/health/db"))
            .respond_with(template)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn ping_measures_round_trip() {
        let (server, executor, target) = setup().await;
        Mock::given(method("GET"))
            .and(path("/auth-service/health/ping"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(45)))
            .mount(&server)
            .await;

        let latency = executor.ping(&target, &CancellationToken::new()).await.unwrap();
        assert!(latency >= 45, "latency {latency} shorter than the server delay");
        assert!(latency < 300, "latency {latency} exceeds the timeout");
    }

    #[tokio::test]
    async fn ping_non_2xx_is_failure() {
        let (server, executor, target) = setup().await;
        Mock::given(path("/auth-service/health/ping"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = executor.ping(&target, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CallError::Status(s) if s.as_u16() == 503));
    }

    #[tokio::test]
    async fn ping_times_out() {
        let (server, executor, target) = setup().await;
        Mock::given(path("/auth-service/health/ping"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let err = executor.ping(&target, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CallError::Timeout(_)));
    }

    #[tokio::test]
    async fn ping_connection_refused_is_transport_failure() {
        let executor = ProbeExecutor::new(outbound::build_client(10).unwrap(), Duration::from_millis(300));
        let target = ProbeTarget {
            name: "ai-service".to_string(),
            base_url: "http://127.0.0.1:1/ai-service".to_string(),
        };
        let err = executor.ping(&target, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CallError::Transport(_)));
    }

    #[tokio::test]
    async fn db_up_uses_total_latency() {
        let (server, executor, target) = setup().await;
        db_returns(&server, ResponseTemplate::new(200).set_body_json(json!({"status": "UP", "latency_ms": 4, "total_latency_ms": 15}))).await;

        assert_eq!(executor.db_health(&target, &CancellationToken::new()).await.unwrap(), 15);
    }

    #[tokio::test]
    async fn db_up_without_latency_reports_zero() {
        let (server, executor, target) = setup().await;
        db_returns(&server, ResponseTemplate::new(200).set_body_json(json!({"status": "UP"}))).await;

        assert_eq!(executor.db_health(&target, &CancellationToken::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn db_non_up_status_is_unhealthy() {
        let (server, executor, target) = setup().await;
        db_returns(&server, ResponseTemplate::new(200).set_body_json(json!({"status": "DOWN", "latency_ms": 9}))).await;

        let err = executor.db_health(&target, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CallError::Unhealthy(ref s) if s == "DOWN"));
    }

    #[tokio::test]
    async fn db_status_match_is_exact() {
        let (server, executor, target) = setup().await;
        db_returns(&server, ResponseTemplate::new(200).set_body_json(json!({"status": "up"}))).await;

        assert!(executor.db_health(&target, &CancellationToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn db_malformed_body_is_decode_failure() {
        let (server, executor, target) = setup().await;
        db_returns(&server, ResponseTemplate::new(200).set_body_string("<html>gateway</html>")).await;

        let err = executor.db_health(&target, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CallError::Decode(_)));
    }

    #[tokio::test]
    async fn db_error_status_is_failure_even_with_up_body() {
        let (server, executor, target) = setup().await;
        db_returns(&server, ResponseTemplate::new(500).set_body_json(json!({"status": "UP"}))).await;

        let err = executor.db_health(&target, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CallError::Status(_)));
    }

    #[tokio::test]
    async fn cancelled_probe_reports_cancellation() {
        let (server, executor, target) = setup().await;
        db_returns(&server, ResponseTemplate::new(200).set_delay(Duration::from_secs(3))).await;

        let token = CancellationToken::new();
        token.cancel();
        let err = executor.db_health(&target, &token).await.unwrap_err();
        assert!(matches!(err, CallError::Cancelled));
    }
}
