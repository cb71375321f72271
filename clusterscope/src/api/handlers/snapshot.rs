//! HTTP handlers for the aggregator snapshot.

use axum::{Json, extract::State, http::StatusCode};

use crate::{AppState, api::models::refresh::RefreshResponse, snapshot::SnapshotState};

#[utoipa::path(
    get,
    path = "/snapshot",
    tag = "snapshot",
    summary = "Get snapshot",
    description = "The last good snapshot, the error of the latest poll if it failed, and when a poll last succeeded.",
    responses(
        (status = 200, description = "Current snapshot state", body = SnapshotState),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_snapshot(State(state): State<AppState>) -> Json<SnapshotState> {
    Json(state.snapshot.state().as_ref().clone())
}

#[utoipa::path(
    post,
    path = "/snapshot/refresh",
    tag = "snapshot",
    summary = "Poll the aggregator now",
    responses(
        (status = 202, description = "Poll started", body = RefreshResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn refresh_snapshot(State(state): State<AppState>) -> (StatusCode, Json<RefreshResponse>) {
    state.snapshot.refresh();
    (
        StatusCode::ACCEPTED,
        Json(RefreshResponse {
            probe_cycle: None,
            snapshot_refresh: true,
        }),
    )
}
