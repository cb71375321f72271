//! # clusterscope: live health of a microservice cluster
//!
//! `clusterscope` serves a dashboard showing which of the platform's services answer, how fast,
//! whether their databases and caches respond, and whether services can reach one another. It
//! holds no history: every number is the latest observation.
//!
//! ## Architecture
//!
//! Three independent pieces run inside one [axum](https://github.com/tokio-rs/axum) process:
//!
//! - **Service proxy** ([`routing`]): browser calls under a known service prefix such as
//!   `/auth-service` are forwarded to a single upstream origin with `Host`, `Origin` and `Referer`
//!   rewritten, so the upstream treats them as same-origin. The proxy runs as middleware ahead of
//!   path matching and keeps no state between requests.
//! - **Probe scheduler** ([`probes`]): on a fixed interval every configured service gets a
//!   `GET {base}/health/ping` and a `GET {base}/health/db`, concurrently and each with its own
//!   deadline. The latest result per service is kept in memory.
//! - **Snapshot poller** ([`snapshot`]): on a slower interval the aggregator's consolidated
//!   `/diagnostics/health` document is fetched. A failed poll keeps the last good snapshot and
//!   records why it failed.
//!
//! Whenever the scheduler or the poller publishes, the view publisher ([`view`]) rebuilds the
//! [`view::DashboardView`] that the API and the embedded dashboard read.
//!
//! ## HTTP surface
//!
//! - `{prefix}/**` for every configured prefix: forwarded upstream
//! - `/healthz`: liveness of this process
//! - `/api/v1/*`: dashboard API, documented at `/api-docs/openapi.json`
//! - `/internal/metrics`: Prometheus metrics when enabled
//! - everything else: the embedded dashboard shell
//!
//! ## Configuration
//!
//! See [`config`] for the YAML layout and `CLUSTERSCOPE_` environment overrides.

pub mod api;
pub mod config;
pub mod errors;
mod openapi;
pub mod outbound;
pub mod probes;
pub mod routing;
pub mod snapshot;
mod static_assets;
pub mod telemetry;
pub mod view;

#[cfg(test)]
mod test;
#[cfg(test)]
pub mod test_utils;

use axum::{
    Json, Router, ServiceExt,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower::Layer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;

use crate::{
    openapi::ApiDoc,
    probes::{ProbeExecutor, ProbeScheduler, ProbeTarget},
    routing::{ProxyRouter, RouteTable, proxy_middleware},
    snapshot::SnapshotPoller,
    view::ViewPublisher,
};

/// Application state shared across all request handlers.
///
/// The scheduler, poller and publisher are cheap handles onto state owned by their background
/// tasks; handlers only read from them or ask them to refresh.
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub probes: ProbeScheduler,
    pub snapshot: SnapshotPoller,
    pub view: ViewPublisher,
}

/// Build the application router: dashboard API, docs, metrics, tracing and the static fallback.
///
/// The service proxy is not part of this router; it wraps it as middleware so that forwarded
/// prefixes are handled before any route or fallback matches.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/dashboard", get(api::handlers::dashboard::get_dashboard))
        .route("/pods", get(api::handlers::dashboard::list_pods))
        .route("/refresh", post(api::handlers::dashboard::refresh_all))
        .route("/probes", get(api::handlers::probes::list_probe_results))
        .route("/probes/refresh", post(api::handlers::probes::refresh_probes))
        .route("/probes/{service}", get(api::handlers::probes::get_probe_result))
        .route("/snapshot", get(api::handlers::snapshot::get_snapshot))
        .route("/snapshot/refresh", post(api::handlers::snapshot::refresh_snapshot));

    let enable_metrics = state.config.enable_metrics;

    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/api/v1", api_routes)
        .fallback(api::handlers::static_assets::serve_embedded_asset)
        .with_state(state);

    if enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

/// Background tasks running alongside the HTTP server.
///
/// [`shutdown`](BackgroundServices::shutdown) cancels the shared token, which stops the interval
/// loops and aborts every in-flight probe and poll, then waits for all of them. Dropping the
/// struct cancels the token as well.
pub struct BackgroundServices {
    probes: ProbeScheduler,
    snapshot: SnapshotPoller,
    view: ViewPublisher,
    shutdown_token: CancellationToken,
    _drop_guard: DropGuard,
}

impl BackgroundServices {
    pub fn probes(&self) -> &ProbeScheduler {
        &self.probes
    }

    pub fn snapshot(&self) -> &SnapshotPoller {
        &self.snapshot
    }

    pub fn view(&self) -> &ViewPublisher {
        &self.view
    }

    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();
        self.probes.stop().await;
        self.snapshot.stop().await;
        self.view.stop().await;
    }
}

/// Create the probe scheduler, snapshot poller and view publisher, and start the enabled ones.
fn setup_background_services(config: &Config, client: reqwest::Client, shutdown_token: CancellationToken) -> BackgroundServices {
    let targets = config
        .probes
        .services
        .iter()
        .map(|service| ProbeTarget {
            name: service.name.clone(),
            base_url: config.service_base_url(service),
        })
        .collect();
    let probes = ProbeScheduler::new(
        ProbeExecutor::new(client.clone(), config.probes.timeout),
        targets,
        config.probes.interval,
        shutdown_token.clone(),
    );
    if config.probes.enabled {
        probes.start();
    } else {
        info!("Probe scheduler disabled by configuration");
    }

    let snapshot = SnapshotPoller::new(
        client,
        config.aggregator_health_url(),
        config.snapshot.interval,
        config.snapshot.timeout,
        shutdown_token.clone(),
    );
    if config.snapshot.enabled {
        snapshot.start();
    } else {
        info!("Snapshot poller disabled by configuration");
    }

    let view = ViewPublisher::new(probes.clone(), snapshot.clone());
    view.start(shutdown_token.clone());

    BackgroundServices {
        probes,
        snapshot,
        view,
        _drop_guard: shutdown_token.clone().drop_guard(),
        shutdown_token,
    }
}

/// Main application struct that owns all resources and the router.
///
/// # Lifecycle
///
/// 1. **Create**: [`Application::new`] builds the HTTP client, the route table and starts the
///    background services
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: When the shutdown signal is received, gracefully stops all services
pub struct Application {
    router: Router,
    proxy: Arc<ProxyRouter>,
    config: Config,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting clusterscope with configuration: {:#?}", config);

        let client = outbound::build_client(config.upstream.max_redirects)?;

        // Create a shutdown token for coordinating graceful shutdown of background tasks
        let shutdown_token = CancellationToken::new();

        let table = RouteTable::from_config(&config.upstream)?;
        info!(
            "Forwarding {} service prefixes to {}",
            table.routes().len(),
            config.upstream.origin
        );
        let proxy = Arc::new(ProxyRouter::new(
            table,
            client.clone(),
            config.upstream.request_timeout,
            config.upstream.max_body_bytes,
            shutdown_token.clone(),
        ));

        let bg_services = setup_background_services(&config, client, shutdown_token);

        let app_state = AppState::builder()
            .config(config.clone())
            .probes(bg_services.probes.clone())
            .snapshot(bg_services.snapshot.clone())
            .view(bg_services.view.clone())
            .build();

        let router = build_router(app_state);

        Ok(Self {
            router,
            proxy,
            config,
            bg_services,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, BackgroundServices) {
        // Apply middleware before path matching for tests
        let middleware = from_fn_with_state(self.proxy, proxy_middleware);
        let service = middleware.layer(self.router).into_make_service();
        let server = axum_test::TestServer::new(service).expect("Failed to create test server");
        (server, self.bg_services)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "clusterscope listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        // Apply middleware before path matching
        let middleware = from_fn_with_state(self.proxy, proxy_middleware);
        let service = middleware.layer(self.router);

        // Run the server with graceful shutdown
        axum::serve(listener, service.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        // Shutdown background services and wait for tasks to complete
        info!("Stopping background services...");
        self.bg_services.shutdown().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
