//! Periodic liveness and database probes for the platform's services.

pub mod executor;
pub mod models;
pub mod scheduler;

pub use executor::ProbeExecutor;
pub use models::{ProbeResult, ProbeStatus, ProbeTarget};
pub use scheduler::ProbeScheduler;
