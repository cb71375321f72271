//! HTTP handlers for the merged dashboard view.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::refresh::RefreshResponse,
    snapshot::PodRecord,
    view::{DashboardView, PodFilter},
};

#[utoipa::path(
    get,
    path = "/dashboard",
    tag = "dashboard",
    summary = "Get dashboard",
    description = "The merged view of the latest snapshot and probe results. Filters narrow the pod list only.",
    params(PodFilter),
    responses(
        (status = 200, description = "Current dashboard view", body = DashboardView),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_dashboard(State(state): State<AppState>, Query(filter): Query<PodFilter>) -> Json<DashboardView> {
    Json(state.view.current().filtered(&filter))
}

#[utoipa::path(
    get,
    path = "/pods",
    tag = "dashboard",
    summary = "List pods",
    description = "Every pod of every infrastructure component, in document order, optionally filtered.",
    params(PodFilter),
    responses(
        (status = 200, description = "Pods matching the filters", body = Vec<PodRecord>),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_pods(State(state): State<AppState>, Query(filter): Query<PodFilter>) -> Json<Vec<PodRecord>> {
    Json(filter.apply(&state.view.current().pods))
}

#[utoipa::path(
    post,
    path = "/refresh",
    tag = "dashboard",
    summary = "Refresh everything",
    description = "Start a probe cycle and a snapshot poll outside their schedules.",
    responses(
        (status = 202, description = "Refresh started", body = RefreshResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn refresh_all(State(state): State<AppState>) -> (StatusCode, Json<RefreshResponse>) {
    let probe_cycle = state.probes.refresh_all();
    state.snapshot.refresh();
    (
        StatusCode::ACCEPTED,
        Json(RefreshResponse {
            probe_cycle: Some(probe_cycle),
            snapshot_refresh: true,
        }),
    )
}
