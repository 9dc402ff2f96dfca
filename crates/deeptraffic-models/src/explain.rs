//! Explain endpoint payloads.

use serde::{Deserialize, Serialize};

/// Base64-encoded frame to explain.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExplainRequest {
    pub frame: String,
    /// Classifier category to explain; the top prediction when absent.
    #[serde(default)]
    pub target_class: Option<usize>,
}

/// Heatmap overlay at the input frame's resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainResponse {
    /// JPEG, base64
    pub heatmap: String,
    pub inference_time_ms: f64,
}
