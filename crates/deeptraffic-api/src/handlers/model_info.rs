//! Model metadata handler.

use axum::extract::State;
use axum::Json;

use deeptraffic_models::ModelInfoResponse;
use deeptraffic_vision::TRACKER_NAME;

use crate::error::ApiResult;
use crate::state::AppState;

const FRAMEWORK: &str = "ONNX Runtime";

/// `/api/model-info`: class table and input size of the loaded detector.
pub async fn model_info(State(state): State<AppState>) -> ApiResult<Json<ModelInfoResponse>> {
    let models = state.lifecycle.models().await?;
    let detector = models.detector.as_ref();
    let classes = detector.class_names().as_map().clone();

    Ok(Json(ModelInfoResponse {
        model_name: state.config.model_name(),
        model_type: detector.model_type().to_string(),
        tracker: TRACKER_NAME.to_string(),
        num_classes: classes.len(),
        classes,
        input_size: detector.input_size(),
        framework: FRAMEWORK.to_string(),
    }))
}
