//! Forwarding of service calls to the upstream origin.
//!
//! - [`table`]: the static prefix → origin mapping
//! - [`proxy`]: the per-request forwarder and its axum middleware

pub mod proxy;
pub mod table;

pub use proxy::{ProxyRouter, proxy_middleware};
pub use table::{RouteTable, ServiceRoute};
