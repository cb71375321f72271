//! HTTP request handlers.
//!
//! - [`dashboard`]: the merged dashboard view, the pod list and the combined refresh
//! - [`probes`]: per-service probe results and manual probe cycles
//! - [`snapshot`]: the aggregator snapshot and manual polls
//! - [`static_assets`]: the embedded app shell with SPA fallback

pub mod dashboard;
pub mod probes;
pub mod snapshot;
pub mod static_assets;
