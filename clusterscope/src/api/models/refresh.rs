use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Acknowledgement for a manual refresh. The work continues in the background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RefreshResponse {
    /// Cycle number of the probe run that was started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_cycle: Option<u64>,
    /// Whether a snapshot poll was started
    pub snapshot_refresh: bool,
}
