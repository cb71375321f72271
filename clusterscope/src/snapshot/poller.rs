//! Background poller for the aggregator's consolidated health document.
//!
//! The `SnapshotPoller` owns the single current [`SnapshotState`]. Each poll either replaces the
//! snapshot wholesale and clears the error, or records an error while keeping the last good
//! snapshot. Polls are numbered at issue time the same way probe cycles are, so a slow manual
//! refresh never overwrites the result of a later scheduled poll.

use arc_swap::ArcSwap;
use axum::http::{HeaderMap, header::CONTENT_TYPE};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

use super::error::{SnapshotError, SnapshotFailure};
use super::models::HealthSnapshot;
use crate::outbound::{self, CallError};

/// How much of an unexpected HTML body ends up in the logs.
const MARKUP_PREVIEW_CHARS: usize = 150;

/// What the dashboard should show for the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    /// No poll has finished yet
    Loading,
    /// Polls have finished but none succeeded
    Failed,
    /// The latest poll succeeded
    Live,
    /// The latest poll failed; the last good snapshot is still held
    Stale,
}

/// Current snapshot, the error of the latest poll if it failed, and when a poll last succeeded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct SnapshotState {
    pub snapshot: Option<HealthSnapshot>,
    pub error: Option<SnapshotFailure>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_updated: Option<DateTime<Utc>>,
    /// Number of the last poll applied to this state, 0 before any poll finished
    pub poll: u64,
}

impl SnapshotState {
    pub fn load_state(&self) -> LoadState {
        match (&self.snapshot, &self.error) {
            _ if self.poll == 0 => LoadState::Loading,
            (None, _) => LoadState::Failed,
            (Some(_), None) => LoadState::Live,
            (Some(_), Some(_)) => LoadState::Stale,
        }
    }

    /// State after poll `poll` finished with `outcome`, or `None` if a later poll was already applied.
    fn apply(&self, poll: u64, outcome: &Result<HealthSnapshot, SnapshotError>, now: DateTime<Utc>) -> Option<Self> {
        if poll < self.poll {
            return None;
        }
        Some(match outcome {
            Ok(snapshot) => Self {
                snapshot: Some(snapshot.clone()),
                error: None,
                last_updated: Some(now),
                poll,
            },
            Err(e) => Self {
                snapshot: self.snapshot.clone(),
                error: Some(e.report()),
                last_updated: self.last_updated,
                poll,
            },
        })
    }
}

fn is_markup(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|content_type| content_type.to_ascii_lowercase().contains("text/html"))
}

/// Owner of the current [`SnapshotState`]. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SnapshotPoller {
    client: Client,
    url: Arc<str>,
    interval: Duration,
    timeout: Duration,
    state: Arc<ArcSwap<SnapshotState>>,
    polls: Arc<AtomicU64>,
    revision: Arc<watch::Sender<u64>>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SnapshotPoller {
    pub fn new(client: Client, url: impl Into<Arc<str>>, interval: Duration, timeout: Duration, shutdown: CancellationToken) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            client,
            url: url.into(),
            interval,
            timeout,
            state: Arc::new(ArcSwap::from_pointee(SnapshotState::default())),
            polls: Arc::new(AtomicU64::new(0)),
            revision: Arc::new(revision),
            shutdown,
            tasks: TaskTracker::new(),
            ticker: Arc::new(Mutex::new(None)),
        }
    }

    pub fn state(&self) -> Arc<SnapshotState> {
        self.state.load_full()
    }

    /// Receiver that changes every time a poll result is applied.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Start the polling task. The first poll runs immediately. Calling it again is a no-op.
    pub fn start(&self) {
        let mut ticker = self.ticker.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if ticker.is_some() {
            return;
        }

        let poller = self.clone();
        *ticker = Some(tokio::spawn(async move {
            info!("Polling {} every {:?}", poller.url, poller.interval);
            let mut interval = tokio::time::interval(poller.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = poller.shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        poller.poll_once().await;
                    }
                }
            }

            info!("Snapshot poller has stopped");
        }));
    }

    /// Cancel the polling task and any in-flight poll, then wait for them to finish.
    pub async fn stop(&self) {
        self.shutdown.cancel();

        let handle = self.ticker.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!("Snapshot poller task ended abnormally: {}", e);
        }

        self.tasks.close();
        self.tasks.wait().await;
    }

    /// Poll in the background, outside the interval.
    pub fn refresh(&self) {
        let poller = self.clone();
        self.tasks.spawn(async move { poller.poll_once().await });
    }

    /// Fetch the document once and apply the outcome. Returns whether the state changed.
    pub async fn poll_once(&self) -> bool {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        let Some(outcome) = self.fetch().await else {
            debug!("Snapshot poll {} cancelled", poll);
            return false;
        };

        let outcome_label = match &outcome {
            Ok(_) => "ok",
            Err(e) => {
                warn!("Snapshot poll failed: {}", e);
                e.kind().as_str()
            }
        };
        metrics::counter!("clusterscope_snapshot_polls_total", "outcome" => outcome_label).increment(1);

        let now = Utc::now();
        let mut applied = false;
        self.state.rcu(|current| match current.apply(poll, &outcome, now) {
            Some(next) => {
                applied = true;
                Arc::new(next)
            }
            None => {
                applied = false;
                Arc::clone(current)
            }
        });

        if applied {
            self.revision.send_modify(|revision| *revision += 1);
        } else {
            debug!("Discarded snapshot poll {}: a later poll already applied", poll);
        }
        applied
    }

    /// `None` when the poll was cancelled by shutdown.
    #[instrument(skip_all, fields(url = %self.url))]
    async fn fetch(&self) -> Option<Result<HealthSnapshot, SnapshotError>> {
        let outcome = outbound::bounded(self.timeout, &self.shutdown, async {
            let response = self.client.get(&*self.url).send().await?;
            let status = response.status().as_u16();

            // Content type is checked first: gateways answer with HTML error pages
            if is_markup(response.headers()) {
                let body = response.text().await.unwrap_or_default();
                let preview: String = body.chars().take(MARKUP_PREVIEW_CHARS).collect();
                debug!("Health endpoint returned HTML instead of JSON: {}", preview);
                return Ok(Err(SnapshotError::MarkupResponse { status }));
            }

            if !response.status().is_success() {
                return Ok(Err(SnapshotError::HttpStatus { status }));
            }

            let body = response.bytes().await?;
            Ok(serde_json::from_slice::<HealthSnapshot>(&body).map_err(|e| SnapshotError::Parse { message: e.to_string() }))
        })
        .await;

        match outcome {
            Ok(parsed) => Some(parsed),
            Err(CallError::Cancelled) => None,
            Err(CallError::Timeout(after)) => Some(Err(SnapshotError::Timeout {
                after_ms: after.as_millis() as u64,
            })),
            Err(CallError::Transport(e)) => Some(Err(SnapshotError::Transport {
                message: format!("{:#}", anyhow::Error::from(e.without_url())),
            })),
            Err(other) => Some(Err(SnapshotError::Transport { message: other.to_string() })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::error::SnapshotErrorKind;
    use crate::snapshot::models::fixtures::snapshot_json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HEALTH_PATH: &str = "/community-service/diagnostics/health";

    fn poller(server: &MockServer, timeout: Duration) -> SnapshotPoller {
        SnapshotPoller::new(
            outbound::build_client(10).unwrap(),
            format!("{}{}", server.uri(), HEALTH_PATH),
            Duration::from_secs(3600),
            timeout,
            CancellationToken::new(),
        )
    }

    async fn respond_once(server: &MockServer, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(HEALTH_PATH))
            .respond_with(template)
            .up_to_n_times(1)
            .mount(server)
            .await;
    }

    fn gateway_page() -> ResponseTemplate {
        ResponseTemplate::new(502).set_body_raw("<html><body>502 Bad Gateway</body></html>", "text/html; charset=utf-8")
    }

    #[test]
    fn load_states() {
        let snapshot: HealthSnapshot = serde_json::from_value(snapshot_json()).unwrap();
        let now = Utc::now();
        let failure = Err(SnapshotError::HttpStatus { status: 500 });

        let initial = SnapshotState::default();
        assert_eq!(initial.load_state(), LoadState::Loading);

        let failed = initial.apply(1, &failure, now).unwrap();
        assert_eq!(failed.load_state(), LoadState::Failed);

        let live = failed.apply(2, &Ok(snapshot), now).unwrap();
        assert_eq!(live.load_state(), LoadState::Live);
        assert!(live.error.is_none());

        let stale = live.apply(3, &failure, now).unwrap();
        assert_eq!(stale.load_state(), LoadState::Stale);
        assert_eq!(stale.snapshot, live.snapshot);
        assert_eq!(stale.last_updated, live.last_updated);

        assert!(stale.apply(2, &failure, now).is_none());
    }

    #[tokio::test]
    async fn successful_poll_replaces_snapshot() {
        let server = MockServer::start().await;
        respond_once(&server, ResponseTemplate::new(200).set_body_json(snapshot_json())).await;

        let poller = poller(&server, Duration::from_secs(2));
        assert!(poller.poll_once().await);

        let state = poller.state();
        assert_eq!(state.load_state(), LoadState::Live);
        assert_eq!(state.snapshot.as_ref().unwrap().overall_status, "DEGRADED");
        assert!(state.last_updated.is_some());
    }

    #[tokio::test]
    async fn gateway_html_keeps_previous_snapshot() {
        let server = MockServer::start().await;
        respond_once(&server, ResponseTemplate::new(200).set_body_json(snapshot_json())).await;
        respond_once(&server, gateway_page()).await;

        let poller = poller(&server, Duration::from_secs(2));
        poller.poll_once().await;
        let before = poller.state();
        poller.poll_once().await;

        let state = poller.state();
        assert_eq!(state.load_state(), LoadState::Stale);
        assert_eq!(state.error.as_ref().unwrap().kind, SnapshotErrorKind::MarkupResponse);
        assert_eq!(state.snapshot.as_ref().unwrap().overall_status, "DEGRADED");
        assert_eq!(state.last_updated, before.last_updated);
    }

    #[tokio::test]
    async fn html_with_success_status_is_still_markup() {
        let server = MockServer::start().await;
        respond_once(&server, ResponseTemplate::new(200).set_body_raw("<!doctype html><html></html>", "text/html")).await;

        let poller = poller(&server, Duration::from_secs(2));
        poller.poll_once().await;

        let state = poller.state();
        assert_eq!(state.load_state(), LoadState::Failed);
        assert_eq!(state.error.as_ref().unwrap().kind, SnapshotErrorKind::MarkupResponse);
    }

    #[tokio::test]
    async fn error_status_and_bad_json_are_reported_separately() {
        let server = MockServer::start().await;
        respond_once(&server, ResponseTemplate::new(503).set_body_json(serde_json::json!({"error": "busy"}))).await;
        respond_once(&server, ResponseTemplate::new(200).set_body_raw("{\"timestamp\": ", "application/json")).await;

        let poller = poller(&server, Duration::from_secs(2));

        poller.poll_once().await;
        let state = poller.state();
        assert_eq!(state.error.as_ref().unwrap().kind, SnapshotErrorKind::HttpStatus);
        assert!(state.error.as_ref().unwrap().message.contains("503"));

        poller.poll_once().await;
        assert_eq!(poller.state().error.as_ref().unwrap().kind, SnapshotErrorKind::Parse);
    }

    #[tokio::test]
    async fn timeout_is_recorded_and_next_poll_still_runs() {
        let server = MockServer::start().await;
        respond_once(&server, ResponseTemplate::new(200).set_delay(Duration::from_secs(3))).await;
        respond_once(&server, ResponseTemplate::new(200).set_body_json(snapshot_json())).await;

        let poller = poller(&server, Duration::from_millis(300));

        poller.poll_once().await;
        assert_eq!(poller.state().error.as_ref().unwrap().kind, SnapshotErrorKind::Timeout);

        poller.poll_once().await;
        assert_eq!(poller.state().load_state(), LoadState::Live);
    }

    #[tokio::test]
    async fn unreachable_aggregator_is_transport_failure() {
        let poller = SnapshotPoller::new(
            outbound::build_client(10).unwrap(),
            "http://127.0.0.1:1/community-service/diagnostics/health",
            Duration::from_secs(3600),
            Duration::from_secs(2),
            CancellationToken::new(),
        );

        poller.poll_once().await;
        let state = poller.state();
        assert_eq!(state.load_state(), LoadState::Failed);
        assert_eq!(state.error.as_ref().unwrap().kind, SnapshotErrorKind::Transport);
    }

    #[tokio::test]
    async fn start_polls_immediately_and_stop_ends_the_loop() {
        let server = MockServer::start().await;
        Mock::given(path(HEALTH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(snapshot_json()))
            .mount(&server)
            .await;

        let poller = poller(&server, Duration::from_secs(2));
        let mut changes = poller.subscribe();
        poller.start();

        tokio::time::timeout(Duration::from_secs(5), changes.changed()).await.unwrap().unwrap();
        assert_eq!(poller.state().load_state(), LoadState::Live);

        tokio::time::timeout(Duration::from_secs(5), poller.stop()).await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_poll_leaves_state_untouched() {
        let server = MockServer::start().await;
        respond_once(&server, ResponseTemplate::new(200).set_delay(Duration::from_secs(30))).await;

        let poller = poller(&server, Duration::from_secs(60));
        poller.refresh();
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(5), poller.stop()).await.unwrap();
        assert_eq!(poller.state().load_state(), LoadState::Loading);
    }
}
