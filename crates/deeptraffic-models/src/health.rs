//! Health and model metadata payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `/api/health` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    /// File name of the detector weights
    pub model_path: String,
    pub tracker: String,
    /// Lifecycle state (`unloaded`, `loading`, `ready`)
    pub state: String,
}

/// `/api/model-info` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfoResponse {
    pub model_name: String,
    pub model_type: String,
    pub tracker: String,
    /// Class id to class name
    pub classes: BTreeMap<u32, String>,
    pub num_classes: usize,
    pub input_size: u32,
    pub framework: String,
}
