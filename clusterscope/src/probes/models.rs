use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::outbound::CallError;

/// Latency reported when a probe produced no measurement.
pub const UNMEASURED_MS: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProbeStatus {
    Up,
    Down,
    /// No probe cycle has completed for the service yet
    Pending,
}

impl ProbeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStatus::Up => "UP",
            ProbeStatus::Down => "DOWN",
            ProbeStatus::Pending => "PENDING",
        }
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A service whose `/health/ping` and `/health/db` endpoints are probed.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeTarget {
    pub name: String,
    /// Base URL without a trailing slash
    pub base_url: String,
}

impl ProbeTarget {
    pub fn ping_url(&self) -> String {
        format!("{}/health/ping", self.base_url)
    }

    pub fn db_url(&self) -> String {
        format!("{}/health/db", self.base_url)
    }
}

/// Body of a `/health/db` response. Only these fields are read.
#[derive(Debug, Deserialize)]
pub struct DbHealthBody {
    pub status: Option<String>,
    pub latency_ms: Option<f64>,
    pub total_latency_ms: Option<f64>,
}

impl DbHealthBody {
    /// Reported latency: `total_latency_ms`, else `latency_ms`, else 0.
    pub fn reported_latency_ms(&self) -> i64 {
        self.total_latency_ms
            .or(self.latency_ms)
            .map(|ms| ms.round().max(0.0) as i64)
            .unwrap_or(0)
    }
}

/// Status and latency of one probe. A DOWN outcome never carries a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub status: ProbeStatus,
    pub latency_ms: i64,
}

impl ProbeOutcome {
    pub fn up(latency_ms: i64) -> Self {
        Self {
            status: ProbeStatus::Up,
            latency_ms,
        }
    }

    pub fn down() -> Self {
        Self {
            status: ProbeStatus::Down,
            latency_ms: UNMEASURED_MS,
        }
    }

    pub fn from_call(result: Result<i64, CallError>) -> Self {
        match result {
            Ok(latency_ms) => Self::up(latency_ms),
            Err(_) => Self::down(),
        }
    }
}

/// Latest liveness and DB check for one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub service: String,
    pub ping_status: ProbeStatus,
    /// Round-trip time of the ping in milliseconds, -1 unless `ping_status` is UP
    pub ping_latency_ms: i64,
    pub db_status: ProbeStatus,
    /// Latency the service reported for its database, -1 unless `db_status` is UP
    pub db_latency_ms: i64,
    /// Probe cycle that produced this result
    pub cycle: u64,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub checked_at: Option<DateTime<Utc>>,
}

impl ProbeResult {
    pub fn pending(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ping_status: ProbeStatus::Pending,
            ping_latency_ms: UNMEASURED_MS,
            db_status: ProbeStatus::Pending,
            db_latency_ms: UNMEASURED_MS,
            cycle: 0,
            checked_at: None,
        }
    }

    pub fn from_outcomes(service: impl Into<String>, cycle: u64, ping: ProbeOutcome, db: ProbeOutcome, checked_at: DateTime<Utc>) -> Self {
        Self {
            service: service.into(),
            ping_status: ping.status,
            ping_latency_ms: ping.latency_ms,
            db_status: db.status,
            db_latency_ms: db.latency_ms,
            cycle,
            checked_at: Some(checked_at),
        }
    }
}
