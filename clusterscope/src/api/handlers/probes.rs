//! HTTP handlers for per-service probe results.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use std::collections::HashMap;

use crate::{AppState, api::models::refresh::RefreshResponse, errors::Error, probes::ProbeResult};

#[utoipa::path(
    get,
    path = "/probes",
    tag = "probes",
    summary = "List probe results",
    description = "Latest probe result for every configured service, keyed by service name. Services not probed yet are PENDING.",
    responses(
        (status = 200, description = "Probe results", body = HashMap<String, ProbeResult>),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_probe_results(State(state): State<AppState>) -> Json<HashMap<String, ProbeResult>> {
    let mut results = state.probes.results();
    for target in state.probes.targets() {
        results
            .entry(target.name.clone())
            .or_insert_with(|| ProbeResult::pending(target.name.clone()));
    }
    Json(results)
}

#[utoipa::path(
    get,
    path = "/probes/{service}",
    tag = "probes",
    summary = "Get probe result",
    params(("service" = String, Path, description = "Service name")),
    responses(
        (status = 200, description = "Probe result", body = ProbeResult),
        (status = 404, description = "Service is not probed"),
    )
)]
#[tracing::instrument(skip(state))]
pub async fn get_probe_result(State(state): State<AppState>, Path(service): Path<String>) -> Result<Json<ProbeResult>, Error> {
    if !state.probes.targets().iter().any(|target| target.name == service) {
        return Err(Error::NotFound {
            resource: "Service".to_string(),
            id: service,
        });
    }

    let result = state.probes.result(&service).unwrap_or_else(|| ProbeResult::pending(service));
    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/probes/refresh",
    tag = "probes",
    summary = "Run probes now",
    description = "Start a probe cycle for every service without waiting for the next tick.",
    responses(
        (status = 202, description = "Probe cycle started", body = RefreshResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn refresh_probes(State(state): State<AppState>) -> (StatusCode, Json<RefreshResponse>) {
    let cycle = state.probes.refresh_all();
    (
        StatusCode::ACCEPTED,
        Json(RefreshResponse {
            probe_cycle: Some(cycle),
            snapshot_refresh: false,
        }),
    )
}
