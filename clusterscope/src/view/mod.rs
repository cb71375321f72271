//! Display-ready aggregates for the dashboard.

pub mod builder;
pub mod pods;
pub mod status;

pub use builder::{DashboardView, ViewModelBuilder, ViewPublisher};
pub use pods::{PodFilter, flatten_pods};
pub use status::{ClassifiedStatus, StatusClass};
