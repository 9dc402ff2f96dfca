//! ONNX Runtime session construction shared by the detector and the
//! explainability classifier.

use std::path::Path;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
#[cfg(any(all(target_os = "linux", feature = "cuda"), target_os = "macos"))]
use tracing::debug;
use tracing::info;

use crate::error::{VisionError, VisionResult};

/// Create an ONNX Runtime session with automatic execution provider selection:
/// CUDA on Linux (with the `cuda` feature), CoreML on macOS, CPU otherwise.
pub(crate) fn create_session(model_path: &Path, label: &str) -> VisionResult<Session> {
    if !model_path.exists() {
        return Err(VisionError::model_not_found(model_path.display().to_string()));
    }

    let model_bytes = std::fs::read(model_path)?;

    let builder = Session::builder()
        .map_err(|e| VisionError::internal(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| VisionError::internal(format!("Failed to set optimization level: {}", e)))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!(model = label, "Using CUDA execution provider");
                return Ok(session);
            }
        }
        debug!(model = label, "CUDA execution provider not available, trying alternatives");
    }

    #[cfg(target_os = "macos")]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        if let Ok(coreml_builder) = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
        {
            if let Ok(session) = coreml_builder.commit_from_memory(&model_bytes) {
                info!(model = label, "Using CoreML execution provider");
                return Ok(session);
            }
        }
        debug!(model = label, "CoreML execution provider not available, using CPU");
    }

    info!(model = label, "Using CPU execution provider");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| VisionError::internal(format!("Failed to load ONNX model {}: {}", label, e)))
}

/// Read a custom metadata entry (e.g. `names`) from a loaded model.
pub(crate) fn custom_metadata(session: &Session, key: &str) -> Option<String> {
    let metadata = session.metadata().ok()?;
    metadata.custom(key).ok().flatten()
}
