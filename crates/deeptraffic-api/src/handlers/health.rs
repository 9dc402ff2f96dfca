//! Health check handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use deeptraffic_models::HealthResponse;
use deeptraffic_vision::TRACKER_NAME;

use crate::lifecycle::LifecycleState;
use crate::state::AppState;

/// `/api/health`: always 200, reports whether the models are usable.
pub async fn api_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let lifecycle = state.lifecycle.state().await;

    Json(HealthResponse {
        status: "ok".to_string(),
        model_loaded: lifecycle == LifecycleState::Ready,
        model_path: state.config.model_file_name(),
        tracker: TRACKER_NAME.to_string(),
        state: lifecycle.to_string(),
    })
}

/// Liveness response.
#[derive(Serialize)]
pub struct LivenessResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub state: String,
    pub active_streams: usize,
}

/// Readiness check endpoint (readiness probe): 503 until the models are loaded.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let lifecycle = state.lifecycle.state().await;
    let is_ready = lifecycle == LifecycleState::Ready;

    let response = ReadinessResponse {
        status: if is_ready { "ready" } else { "not_ready" }.to_string(),
        state: lifecycle.to_string(),
        active_streams: state.trackers.len(),
    };

    if is_ready {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
