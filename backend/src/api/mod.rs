//! HTTP API for the Rollcall backend.
//!
//! - [`server`] - axum router and handlers
//! - [`types`] - request/response shapes
//! - [`logs`] - real-time pipeline log streaming

pub mod logs;
pub mod server;
pub mod types;
