//! Axum HTTP API server.
//!
//! This crate provides:
//! - Single-image detection with a record history
//! - Sampled video analysis and byte-range video delivery
//! - A WebSocket live detection stream
//! - Rate limiting, security headers and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod security;
pub mod state;
pub mod ws;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
