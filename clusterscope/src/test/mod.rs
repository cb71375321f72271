//! End-to-end tests: a full [`Application`] against a wiremock upstream.

use axum::http::StatusCode;
use serde_json::Value;
use std::time::Duration;
use wiremock::matchers::{any, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::snapshot::models::fixtures::snapshot_json;
use crate::test_utils::{create_test_app, create_test_config, mount_healthy_service};
use crate::{Application, AppState, build_router};

/// Poll `url` on `server` until `done` accepts the JSON body, or give up after a few seconds.
async fn wait_for(server: &axum_test::TestServer, url: &str, done: impl Fn(&Value) -> bool) -> Value {
    let mut json = Value::Null;
    for _ in 0..50 {
        json = server.get(url).await.json();
        if done(&json) {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("condition never held for {url}, last body: {json}");
}

#[test_log::test(tokio::test)]
async fn test_proxy_and_local_routes_share_one_listener() {
    let upstream = MockServer::start().await;
    let authority = upstream.uri().trim_start_matches("http://").to_string();

    Mock::given(method("PUT"))
        .and(path("/assessment-service/v1/attempts/42"))
        .and(header("host", authority.as_str()))
        .and(header("origin", upstream.uri().as_str()))
        .and(header("x-institute-id", "inst-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"saved": true})))
        .expect(1)
        .mount(&upstream)
        .await;

    let (server, bg_services) = create_test_app(create_test_config(&upstream)).await;

    let response = server
        .put("/assessment-service/v1/attempts/42")
        .add_header("origin", "http://localhost:5173")
        .add_header("x-institute-id", "inst-7")
        .json(&serde_json::json!({"answer": "b"}))
        .await;
    response.assert_status(StatusCode::OK);
    assert_eq!(response.json::<Value>()["saved"], true);

    // Local routes are never forwarded
    server.get("/healthz").await.assert_text("OK");
    server.get("/api/v1/dashboard").await.assert_status(StatusCode::OK);

    // Unknown paths get the dashboard shell
    let shell = server.get("/services/auth-service").await;
    shell.assert_status(StatusCode::OK);
    assert!(shell.text().contains("<!doctype html>"));

    bg_services.shutdown().await;
}

#[tokio::test]
async fn test_prefix_lookalikes_are_not_forwarded() {
    let upstream = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let (server, bg_services) = create_test_app(create_test_config(&upstream)).await;

    // Not one of the configured prefixes, so it reaches the app shell
    let response = server.get("/auth/login").await;
    response.assert_status(StatusCode::OK);
    assert!(response.text().contains("<!doctype html>"));

    bg_services.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_upstream_is_a_proxy_error() {
    let upstream = MockServer::start().await;
    let mut config = create_test_config(&upstream);
    config.upstream.origin = "http://127.0.0.1:1".parse().unwrap();

    let (server, bg_services) = create_test_app(config).await;

    let response = server.get("/media-service/files/1").await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.text().starts_with("Proxy Error: "));

    bg_services.shutdown().await;
}

/// Full loop: schedules running, the aggregator later serves a gateway page, and the
/// dashboard keeps the last good data with a markup error attached.
#[test_log::test(tokio::test)]
async fn test_dashboard_survives_gateway_errors() {
    let upstream = MockServer::start().await;
    mount_healthy_service(&upstream, "auth-service").await;
    Mock::given(path("/community-service/diagnostics/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(snapshot_json()))
        .up_to_n_times(1)
        .mount(&upstream)
        .await;
    Mock::given(path("/community-service/diagnostics/health"))
        .respond_with(ResponseTemplate::new(502).set_body_raw("<html><body>Bad Gateway</body></html>", "text/html"))
        .mount(&upstream)
        .await;

    let mut config = create_test_config(&upstream);
    config.probes.enabled = true;
    config.probes.interval = Duration::from_millis(200);
    config.probes.timeout = Duration::from_millis(150);
    config.probes.services.truncate(1);
    config.snapshot.enabled = true;
    config.snapshot.interval = Duration::from_secs(1);

    let (server, bg_services) = create_test_app(config).await;

    let live = wait_for(&server, "/api/v1/dashboard", |json| {
        json["snapshot"]["state"] == "live" && json["services"][0]["probe"]["pingStatus"] == "UP"
    })
    .await;
    assert_eq!(live["overall_status"]["status"], "DEGRADED");
    assert_eq!(live["average_latency_ms"], 60.0);
    assert_eq!(live["problem_pod_count"], 2);

    let stale = wait_for(&server, "/api/v1/dashboard", |json| json["snapshot"]["state"] == "stale").await;
    assert_eq!(stale["snapshot"]["error"]["kind"], "markup_response");
    assert_eq!(stale["overall_status"]["status"], "DEGRADED");
    assert_eq!(stale["snapshot"]["last_updated"], live["snapshot"]["last_updated"]);

    let filtered: Value = server
        .get("/api/v1/dashboard")
        .add_query_param("search", "redis")
        .add_query_param("problems_only", "true")
        .await
        .json();
    assert_eq!(filtered["pods"].as_array().unwrap().len(), 1);
    assert_eq!(filtered["pods"][0]["name"], "redis-xyz");

    tokio::time::timeout(Duration::from_secs(5), bg_services.shutdown())
        .await
        .expect("background services did not stop");
}

#[tokio::test]
async fn test_failed_first_load_is_reported_as_failed() {
    let upstream = MockServer::start().await;
    Mock::given(path("/community-service/diagnostics/health"))
        .respond_with(ResponseTemplate::new(404).set_body_raw("<!doctype html><title>Not Found</title>", "text/html"))
        .mount(&upstream)
        .await;

    let (server, bg_services) = create_test_app(create_test_config(&upstream)).await;
    server.post("/api/v1/snapshot/refresh").await.assert_status(StatusCode::ACCEPTED);

    let failed = wait_for(&server, "/api/v1/dashboard", |json| json["snapshot"]["state"] == "failed").await;
    assert_eq!(failed["snapshot"]["error"]["kind"], "markup_response");
    assert!(failed["overall_status"].is_null());
    assert!(failed["pods"].as_array().unwrap().is_empty());

    bg_services.shutdown().await;
}

#[tokio::test]
async fn test_probe_failures_stay_per_service() {
    let upstream = MockServer::start().await;
    mount_healthy_service(&upstream, "auth-service").await;
    Mock::given(path("/media-service/health/ping"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&upstream)
        .await;
    Mock::given(path("/media-service/health/db"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "DOWN"})))
        .mount(&upstream)
        .await;

    let mut config = create_test_config(&upstream);
    config.probes.timeout = Duration::from_millis(300);
    config.probes.services.retain(|s| s.name == "auth-service" || s.name == "media-service");

    let (server, bg_services) = create_test_app(config).await;
    let cycle = bg_services.probes().run_cycle().await;

    let results: Value = server.get("/api/v1/probes").await.json();
    assert_eq!(results["auth-service"]["cycle"], cycle);
    assert_eq!(results["auth-service"]["pingStatus"], "UP");
    assert_eq!(results["auth-service"]["dbLatencyMs"], 5);
    assert_eq!(results["media-service"]["pingStatus"], "DOWN");
    assert_eq!(results["media-service"]["pingLatencyMs"], -1);
    assert_eq!(results["media-service"]["dbStatus"], "DOWN");
    assert_eq!(results["media-service"]["dbLatencyMs"], -1);

    bg_services.shutdown().await;
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let upstream = MockServer::start().await;
    let (server, bg_services) = create_test_app(create_test_config(&upstream)).await;

    let response = server.get("/api-docs/openapi.json").await;
    response.assert_status(StatusCode::OK);
    let doc: Value = response.json();
    assert!(doc["paths"]["/dashboard"].is_object());
    assert!(doc["components"]["schemas"]["DashboardView"].is_object());

    bg_services.shutdown().await;
}

#[tokio::test]
async fn test_build_router_with_metrics_disabled() {
    let upstream = MockServer::start().await;
    let config = create_test_config(&upstream);
    let app = Application::new(config.clone()).await.unwrap();

    let state = AppState::builder()
        .config(config)
        .probes(app.bg_services.probes().clone())
        .snapshot(app.bg_services.snapshot().clone())
        .view(app.bg_services.view().clone())
        .build();
    let server = axum_test::TestServer::new(build_router(state)).unwrap();

    // Falls through to the app shell
    let metrics_content = server.get("/internal/metrics").await.text();
    assert!(!metrics_content.contains("# HELP") && !metrics_content.contains("# TYPE"));
}

#[tokio::test]
async fn test_build_router_with_metrics_enabled() {
    let upstream = MockServer::start().await;
    let mut config = create_test_config(&upstream);
    config.enable_metrics = true;

    let (server, bg_services) = create_test_app(config).await;
    server.get("/healthz").await.assert_status(StatusCode::OK);

    let metrics_response = server.get("/internal/metrics").await;
    metrics_response.assert_status(StatusCode::OK);
    let metrics_content = metrics_response.text();
    assert!(metrics_content.contains("# HELP") || metrics_content.contains("# TYPE"));

    bg_services.shutdown().await;
}
