//! Saliency heatmap handler.

use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use deeptraffic_models::{round_to, ExplainRequest, ExplainResponse};
use deeptraffic_vision::{decode_frame, run_explanation, ExplainOptions};

use crate::error::ApiResult;
use crate::handlers::run_inference;
use crate::metrics;
use crate::state::AppState;

/// `/api/explain`: overlay a class saliency heatmap on the frame.
pub async fn explain(
    State(state): State<AppState>,
    payload: Result<Json<ExplainRequest>, JsonRejection>,
) -> ApiResult<Json<ExplainResponse>> {
    let Json(request) = payload?;
    let models = state.lifecycle.models().await?;

    let options = ExplainOptions {
        target_class: request.target_class,
        image_weight: state.config.heatmap_image_weight,
        ..ExplainOptions::default()
    };
    let max_dimension = state.config.max_frame_dimension;
    let frame_payload = request.frame;

    let (heatmap, elapsed) = run_inference("explain", state.config.inference_timeout, move |_gate| {
        let start = Instant::now();
        let frame = decode_frame(&frame_payload, max_dimension)?;
        let heatmap = run_explanation(models.saliency.as_ref(), &frame, &options)?;
        Ok((heatmap, start.elapsed()))
    })
    .await?;

    metrics::record_inference("explain", elapsed.as_secs_f64());

    Ok(Json(ExplainResponse {
        heatmap,
        inference_time_ms: round_to(elapsed.as_secs_f64() * 1000.0, 2),
    }))
}
