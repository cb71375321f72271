//! Dashboard view model derived from the current snapshot and probe results.
//!
//! [`ViewModelBuilder::build`] is a pure function of its inputs. The [`ViewPublisher`] task
//! re-runs it whenever the probe scheduler or the snapshot poller publishes something new and
//! stores the result for request handlers to read.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::pods::{PodFilter, flatten_pods};
use super::status::{ClassifiedStatus, StatusClass};
use crate::probes::{ProbeResult, ProbeScheduler, ProbeStatus, ProbeTarget};
use crate::snapshot::{
    ConnectivityEdge, HealthSnapshot, LoadState, PodRecord, SnapshotFailure, SnapshotPoller, SnapshotState,
    models::{ClusterEvent, DependencyStatus, ServiceStatus},
};

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SnapshotSummary {
    pub state: LoadState,
    pub error: Option<SnapshotFailure>,
    /// Completion time of the last successful poll
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_updated: Option<DateTime<Utc>>,
    /// Timestamp the aggregator put on the snapshot
    pub timestamp: Option<String>,
}

/// One service: our own probes merged with what the aggregator reports.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ServiceView {
    pub name: String,
    /// Absent for services only the aggregator knows about
    pub probe: Option<ProbeResult>,
    pub ping_class: Option<StatusClass>,
    pub db_class: Option<StatusClass>,
    pub reported: Option<ClassifiedStatus>,
    pub reported_response_time_ms: Option<f64>,
    /// Worst class of the parts that have reported
    pub class: StatusClass,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct InfrastructureView {
    pub name: String,
    #[serde(flatten)]
    pub status: ClassifiedStatus,
    pub ready_replicas: Option<u32>,
    pub total_replicas: Option<u32>,
    pub restart_count: Option<u32>,
    pub external_ip: Option<String>,
    pub pod_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DependencyView {
    pub name: String,
    #[serde(flatten)]
    pub status: ClassifiedStatus,
    pub connected: bool,
    pub response_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ConnectivityView {
    #[serde(flatten)]
    pub edge: ConnectivityEdge,
    pub class: StatusClass,
}

/// Everything the dashboard renders.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DashboardView {
    pub snapshot: SnapshotSummary,
    pub overall_status: Option<ClassifiedStatus>,
    /// Mean aggregator-reported response time; absent when no services are reported
    pub average_latency_ms: Option<f64>,
    pub services: Vec<ServiceView>,
    pub infrastructure: Vec<InfrastructureView>,
    pub dependencies: Vec<DependencyView>,
    pub pods: Vec<PodRecord>,
    /// Problem pods across the whole snapshot, regardless of filters
    pub problem_pod_count: usize,
    pub connectivity: Vec<ConnectivityView>,
    pub recent_events: Vec<ClusterEvent>,
    #[schema(value_type = String, format = "date-time")]
    pub generated_at: DateTime<Utc>,
}

impl DashboardView {
    /// Copy of this view with the pod list narrowed by `filter`.
    pub fn filtered(&self, filter: &PodFilter) -> DashboardView {
        let mut view = self.clone();
        if !filter.is_empty() {
            view.pods = filter.apply(&self.pods);
        }
        view
    }
}

/// Mean of the reported response times, `None` for an empty list.
pub fn average_latency(snapshot: &HealthSnapshot) -> Option<f64> {
    let services = &snapshot.application_services;
    if services.is_empty() {
        return None;
    }
    let total: f64 = services.iter().map(|s| s.response_time_ms).sum();
    Some(total / services.len() as f64)
}

fn probe_class(status: ProbeStatus) -> Option<StatusClass> {
    match status {
        ProbeStatus::Pending => None,
        reported => Some(StatusClass::classify(reported.as_str())),
    }
}

pub struct ViewModelBuilder;

impl ViewModelBuilder {
    /// Probed services come first in configured order, followed by services only the aggregator reports.
    pub fn build(state: &SnapshotState, targets: &[ProbeTarget], probes: &HashMap<String, ProbeResult>, now: DateTime<Utc>) -> DashboardView {
        let snapshot = state.snapshot.as_ref();
        let summary = SnapshotSummary {
            state: state.load_state(),
            error: state.error.clone(),
            last_updated: state.last_updated,
            timestamp: snapshot.map(|s| s.timestamp.clone()),
        };

        let Some(snapshot) = snapshot else {
            return DashboardView {
                snapshot: summary,
                overall_status: None,
                average_latency_ms: None,
                services: Self::services(targets, probes, &[]),
                infrastructure: Vec::new(),
                dependencies: Vec::new(),
                pods: Vec::new(),
                problem_pod_count: 0,
                connectivity: Vec::new(),
                recent_events: Vec::new(),
                generated_at: now,
            };
        };

        let pods = flatten_pods(snapshot);
        let problem_pod_count = pods.iter().filter(|pod| pod.has_problem()).count();

        DashboardView {
            snapshot: summary,
            overall_status: Some(ClassifiedStatus::new(snapshot.overall_status.clone())),
            average_latency_ms: average_latency(snapshot),
            services: Self::services(targets, probes, &snapshot.application_services),
            infrastructure: snapshot
                .kubernetes_infrastructure
                .iter()
                .map(|(name, component)| InfrastructureView {
                    name: name.clone(),
                    status: ClassifiedStatus::new(component.status.clone()),
                    ready_replicas: component.ready_replicas,
                    total_replicas: component.total_replicas,
                    restart_count: component.restart_count,
                    external_ip: component.external_ip.clone(),
                    pod_count: component.pods.as_ref().map_or(0, Vec::len),
                })
                .collect(),
            dependencies: vec![
                Self::dependency("redis", &snapshot.dependencies.redis),
                Self::dependency("postgresql", &snapshot.dependencies.postgresql),
            ],
            pods,
            problem_pod_count,
            connectivity: snapshot
                .connectivity_matrix
                .iter()
                .map(|edge| ConnectivityView {
                    edge: edge.clone(),
                    class: StatusClass::classify(&edge.status),
                })
                .collect(),
            recent_events: snapshot.recent_events.clone(),
            generated_at: now,
        }
    }

    fn services(targets: &[ProbeTarget], probes: &HashMap<String, ProbeResult>, reported: &[ServiceStatus]) -> Vec<ServiceView> {
        let reported_by_name: HashMap<&str, &ServiceStatus> =
            reported.iter().map(|service| (service.name.as_str(), service)).collect();

        let probed = targets.iter().map(|target| {
            let probe = probes
                .get(&target.name)
                .cloned()
                .unwrap_or_else(|| ProbeResult::pending(target.name.clone()));
            Self::service(target.name.clone(), Some(probe), reported_by_name.get(target.name.as_str()).copied())
        });

        let reported_only = reported
            .iter()
            .filter(|service| !targets.iter().any(|target| target.name == service.name))
            .map(|service| Self::service(service.name.clone(), None, Some(service)));

        probed.chain(reported_only).collect()
    }

    fn service(name: String, probe: Option<ProbeResult>, reported: Option<&ServiceStatus>) -> ServiceView {
        let ping_class = probe.as_ref().and_then(|p| probe_class(p.ping_status));
        let db_class = probe.as_ref().and_then(|p| probe_class(p.db_status));
        let reported_status = reported.map(|s| ClassifiedStatus::new(s.status.clone()));

        let class = StatusClass::worst(ping_class.into_iter().chain(db_class).chain(reported_status.as_ref().map(|s| s.class)))
            .unwrap_or(StatusClass::Unknown);

        ServiceView {
            name,
            probe,
            ping_class,
            db_class,
            reported: reported_status,
            reported_response_time_ms: reported.map(|s| s.response_time_ms),
            class,
        }
    }

    fn dependency(name: &str, dependency: &DependencyStatus) -> DependencyView {
        DependencyView {
            name: name.to_string(),
            status: ClassifiedStatus::new(dependency.status.clone()),
            connected: dependency.connected,
            response_time_ms: dependency.response_time_ms,
        }
    }
}

/// Keeps the latest [`DashboardView`] up to date in the background.
#[derive(Clone)]
pub struct ViewPublisher {
    current: Arc<ArcSwap<DashboardView>>,
    probes: ProbeScheduler,
    snapshot: SnapshotPoller,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ViewPublisher {
    pub fn new(probes: ProbeScheduler, snapshot: SnapshotPoller) -> Self {
        let initial = Self::render(&probes, &snapshot);
        Self {
            current: Arc::new(ArcSwap::from_pointee(initial)),
            probes,
            snapshot,
            handle: Arc::new(Mutex::new(None)),
        }
    }

    fn render(probes: &ProbeScheduler, snapshot: &SnapshotPoller) -> DashboardView {
        ViewModelBuilder::build(&snapshot.state(), probes.targets(), &probes.results(), Utc::now())
    }

    pub fn current(&self) -> Arc<DashboardView> {
        self.current.load_full()
    }

    /// Rebuild the view immediately.
    pub fn rebuild(&self) {
        self.current.store(Arc::new(Self::render(&self.probes, &self.snapshot)));
    }

    /// Start rebuilding on every probe or snapshot change until `shutdown` is cancelled.
    pub fn start(&self, shutdown: CancellationToken) {
        let mut handle = self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if handle.is_some() {
            return;
        }

        let publisher = self.clone();
        let mut probe_changes = self.probes.subscribe();
        let mut snapshot_changes = self.snapshot.subscribe();
        // Anything published since the view was first rendered is picked up straight away
        probe_changes.mark_changed();

        *handle = Some(tokio::spawn(async move {
            info!("View publisher started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    changed = probe_changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    changed = snapshot_changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                publisher.rebuild();
                debug!("Dashboard view rebuilt");
            }
            info!("View publisher has stopped");
        }));
    }

    pub async fn stop(&self) {
        let handle = self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!("View publisher task ended abnormally: {}", e);
        }
    }
}
