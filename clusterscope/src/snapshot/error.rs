use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Why a snapshot poll did not produce a new snapshot.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotError {
    /// The aggregator answered with an HTML page, usually a gateway error or an SPA fallback
    #[error("Received HTML instead of JSON (HTTP {status}); the aggregator is likely unreachable behind a gateway or proxy")]
    MarkupResponse { status: u16 },

    #[error("Failed to fetch health data: HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("Malformed health document: {message}")]
    Parse { message: String },

    #[error("Health request failed: {message}")]
    Transport { message: String },

    #[error("Health request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

impl SnapshotError {
    pub fn kind(&self) -> SnapshotErrorKind {
        match self {
            SnapshotError::MarkupResponse { .. } => SnapshotErrorKind::MarkupResponse,
            SnapshotError::HttpStatus { .. } => SnapshotErrorKind::HttpStatus,
            SnapshotError::Parse { .. } => SnapshotErrorKind::Parse,
            SnapshotError::Transport { .. } => SnapshotErrorKind::Transport,
            SnapshotError::Timeout { .. } => SnapshotErrorKind::Timeout,
        }
    }

    pub fn report(&self) -> SnapshotFailure {
        SnapshotFailure {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotErrorKind {
    MarkupResponse,
    HttpStatus,
    Parse,
    Transport,
    Timeout,
}

impl SnapshotErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotErrorKind::MarkupResponse => "markup_response",
            SnapshotErrorKind::HttpStatus => "http_status",
            SnapshotErrorKind::Parse => "parse",
            SnapshotErrorKind::Transport => "transport",
            SnapshotErrorKind::Timeout => "timeout",
        }
    }
}

/// Serializable form of a [`SnapshotError`] for API consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SnapshotFailure {
    pub kind: SnapshotErrorKind,
    pub message: String,
}
