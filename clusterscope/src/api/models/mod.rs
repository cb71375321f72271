//! Request and response bodies for the dashboard API.

pub mod refresh;
