//! Consolidated cluster health from the aggregator's `/diagnostics/health` endpoint.

pub mod error;
pub mod models;
pub mod poller;

pub use error::{SnapshotError, SnapshotErrorKind, SnapshotFailure};
pub use models::{ConnectivityEdge, HealthSnapshot, InfrastructureComponent, PodRecord};
pub use poller::{LoadState, SnapshotPoller, SnapshotState};
