//! OpenAPI documentation for the dashboard API at `/api/v1/*`.
//!
//! Forwarded service prefixes are not documented here; they belong to the upstream services.

use utoipa::OpenApi;

use crate::{api, probes, snapshot, view};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "clusterscope",
        description = "Live operational picture of the platform's services, their dependencies and the cluster they run on."
    ),
    servers(
        (url = "/api/v1", description = "Dashboard API")
    ),
    paths(
        api::handlers::dashboard::get_dashboard,
        api::handlers::dashboard::list_pods,
        api::handlers::dashboard::refresh_all,
        api::handlers::probes::list_probe_results,
        api::handlers::probes::get_probe_result,
        api::handlers::probes::refresh_probes,
        api::handlers::snapshot::get_snapshot,
        api::handlers::snapshot::refresh_snapshot,
    ),
    components(
        schemas(
            api::models::refresh::RefreshResponse,
            probes::ProbeResult,
            probes::ProbeStatus,
            snapshot::HealthSnapshot,
            snapshot::InfrastructureComponent,
            snapshot::PodRecord,
            snapshot::ConnectivityEdge,
            snapshot::models::ServiceStatus,
            snapshot::models::Dependencies,
            snapshot::models::DependencyStatus,
            snapshot::models::ClusterEvent,
            snapshot::SnapshotState,
            snapshot::SnapshotFailure,
            snapshot::SnapshotErrorKind,
            snapshot::LoadState,
            view::DashboardView,
            view::builder::SnapshotSummary,
            view::builder::ServiceView,
            view::builder::InfrastructureView,
            view::builder::DependencyView,
            view::builder::ConnectivityView,
            view::ClassifiedStatus,
            view::StatusClass,
        )
    ),
    tags(
        (name = "dashboard", description = "The merged view the dashboard renders."),
        (name = "probes", description = "Liveness and database probes issued against each service."),
        (name = "snapshot", description = "The consolidated health document reported by the aggregator."),
    )
)]
pub struct ApiDoc;
