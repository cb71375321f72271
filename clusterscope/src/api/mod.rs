//! HTTP API: handlers and the bodies they exchange.

pub mod handlers;
pub mod models;
