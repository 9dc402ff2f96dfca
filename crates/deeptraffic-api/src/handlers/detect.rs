//! Object detection and tracking handler.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tracing::debug;

use deeptraffic_models::{round_to, DetectRequest, DetectResponse};
use deeptraffic_vision::streams::validate_stream_id;
use deeptraffic_vision::{decode_frame, run_detection, DetectParams, TRACKER_NAME};

use crate::error::ApiResult;
use crate::handlers::run_inference;
use crate::metrics;
use crate::state::AppState;

/// `/api/detect`: detect objects in one frame and, unless `track` is false,
/// continue the tracks of the frame's stream.
pub async fn detect(
    State(state): State<AppState>,
    payload: Result<Json<DetectRequest>, JsonRejection>,
) -> ApiResult<Json<DetectResponse>> {
    let Json(request) = payload?;
    let models = state.lifecycle.models().await?;

    let params = DetectParams::new(request.conf, request.iou, request.imgsz);
    params.validate()?;
    if request.track {
        validate_stream_id(&request.stream_id)?;
    }

    let max_dimension = state.config.max_frame_dimension;
    let frame_payload = request.frame;
    // The session is only touched once the frame has decoded, so rejected
    // requests never create or evict tracker sessions.
    let trackers = request.track.then(|| Arc::clone(&state.trackers));
    let stream_id = request.stream_id.clone();

    let outcome = run_inference("detect", state.config.inference_timeout, move |gate| {
        let frame = decode_frame(&frame_payload, max_dimension)?;
        let tracker = trackers
            .map(|registry| registry.session(&stream_id))
            .transpose()?;
        run_detection(models.detector.as_ref(), tracker.as_deref(), &frame, &params, gate)
    })
    .await?;

    metrics::set_active_streams(state.trackers.len());
    metrics::record_inference("detect", outcome.inference_time.as_secs_f64());
    metrics::record_detections(&outcome.batch.count_by_class);
    debug!(
        stream_id = %request.stream_id,
        vehicle_count = outcome.batch.vehicle_count,
        "Frame processed"
    );

    Ok(Json(DetectResponse {
        detections: outcome.batch.detections,
        vehicle_count: outcome.batch.vehicle_count,
        count_by_class: outcome.batch.count_by_class,
        inference_time_ms: round_to(outcome.inference_time.as_secs_f64() * 1000.0, 2),
        frame_width: outcome.frame_width,
        frame_height: outcome.frame_height,
        tracker: TRACKER_NAME.to_string(),
        stream_id: request.stream_id,
    }))
}
