//! Axum HTTP API for DeepTraffic.
//!
//! This crate provides:
//! - Object detection with per-stream tracking (`/api/detect`)
//! - Saliency heatmaps (`/api/explain`)
//! - Model lifecycle with health and readiness probes
//! - Rate limiting, security headers and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use lifecycle::{LifecycleState, LoadedModels, ModelLifecycle};
pub use routes::create_router;
pub use state::AppState;
