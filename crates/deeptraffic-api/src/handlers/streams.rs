//! Tracker session handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::info;

use deeptraffic_models::{StreamInfo, StreamListResponse};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// `GET /api/streams`: live tracker sessions, ordered by stream id.
pub async fn list_streams(State(state): State<AppState>) -> Json<StreamListResponse> {
    let streams = state
        .trackers
        .snapshot()
        .into_iter()
        .map(|s| StreamInfo {
            stream_id: s.stream_id,
            active_tracks: s.active_tracks,
            frames_processed: s.frames_processed,
            idle_secs: s.idle.as_secs(),
        })
        .collect();

    Json(StreamListResponse { streams })
}

/// `DELETE /api/streams/:stream_id`: forget a stream's tracks. The next
/// frame for that stream starts again at track id 1.
pub async fn delete_stream(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> ApiResult<StatusCode> {
    if !state.trackers.remove(&stream_id) {
        return Err(ApiError::not_found(format!("Stream '{}' not found", stream_id)));
    }

    metrics::set_active_streams(state.trackers.len());
    info!(stream_id = %stream_id, "Tracker session removed");
    Ok(StatusCode::NO_CONTENT)
}
