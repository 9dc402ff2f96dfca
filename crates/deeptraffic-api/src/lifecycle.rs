//! Model lifecycle: unloaded, loading, ready.
//!
//! The server binds before the models are loaded. Until [`ModelLifecycle::load`]
//! finishes, every model-backed endpoint answers 503.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;
use tracing::{error, info};

use deeptraffic_vision::{
    DetectorConfig, ObjectDetector, SaliencyConfig, SaliencyModel, ScoreCam, VisionResult,
    YoloDetector,
};

use crate::error::{ApiError, ApiResult};
use crate::metrics;

/// Models shared by all requests once loading has finished.
pub struct LoadedModels {
    pub detector: Arc<dyn ObjectDetector>,
    pub saliency: Arc<dyn SaliencyModel>,
}

impl LoadedModels {
    pub fn new(detector: Arc<dyn ObjectDetector>, saliency: Arc<dyn SaliencyModel>) -> Self {
        Self { detector, saliency }
    }

    /// Load both models from disk and run a warm-up inference on each.
    ///
    /// Blocking; call from a blocking thread.
    pub fn from_config(detector: &DetectorConfig, saliency: &SaliencyConfig) -> VisionResult<Self> {
        let detector = YoloDetector::new(detector.clone())?;
        detector.warm_up()?;
        let saliency = ScoreCam::new(saliency.clone())?;
        saliency.warm_up()?;
        Ok(Self::new(Arc::new(detector), Arc::new(saliency)))
    }
}

/// Lifecycle state name, as reported by `/api/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unloaded,
    Loading,
    Ready,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Unloaded => "unloaded",
            LifecycleState::Loading => "loading",
            LifecycleState::Ready => "ready",
        }
    }

    fn gauge_value(&self) -> f64 {
        match self {
            LifecycleState::Unloaded => 0.0,
            LifecycleState::Loading => 1.0,
            LifecycleState::Ready => 2.0,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum ModelState {
    Unloaded,
    Loading,
    Ready(Arc<LoadedModels>),
}

/// Owner of the loaded models.
pub struct ModelLifecycle {
    state: RwLock<ModelState>,
}

impl Default for ModelLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelLifecycle {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ModelState::Unloaded),
        }
    }

    pub async fn state(&self) -> LifecycleState {
        match &*self.state.read().await {
            ModelState::Unloaded => LifecycleState::Unloaded,
            ModelState::Loading => LifecycleState::Loading,
            ModelState::Ready(_) => LifecycleState::Ready,
        }
    }

    pub async fn is_ready(&self) -> bool {
        self.state().await == LifecycleState::Ready
    }

    /// Loaded models, or 503 when loading has not finished.
    pub async fn models(&self) -> ApiResult<Arc<LoadedModels>> {
        match &*self.state.read().await {
            ModelState::Ready(models) => Ok(Arc::clone(models)),
            _ => Err(ApiError::model_not_loaded()),
        }
    }

    /// Run `loader` on a blocking thread and publish its models.
    ///
    /// On failure the state falls back to unloaded and the error is returned
    /// so the caller can shut the server down.
    pub async fn load<F>(&self, loader: F) -> ApiResult<()>
    where
        F: FnOnce() -> VisionResult<LoadedModels> + Send + 'static,
    {
        self.set(ModelState::Loading).await;
        info!("Loading models");
        let start = Instant::now();

        let result = tokio::task::spawn_blocking(loader)
            .await
            .map_err(|e| ApiError::internal(format!("Model loader panicked: {}", e)))
            .and_then(|r| r.map_err(ApiError::from));

        match result {
            Ok(models) => {
                info!(
                    detector_classes = models.detector.class_names().len(),
                    saliency = models.saliency.name(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Models loaded and warmed up"
                );
                self.set(ModelState::Ready(Arc::new(models))).await;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Model loading failed");
                self.set(ModelState::Unloaded).await;
                Err(e)
            }
        }
    }

    /// Publish already-constructed models.
    pub async fn install(&self, models: LoadedModels) {
        self.set(ModelState::Ready(Arc::new(models))).await;
    }

    /// Drop the models. In-flight requests keep their own handle until
    /// they finish.
    pub async fn unload(&self) {
        self.set(ModelState::Unloaded).await;
        info!("Models unloaded");
    }

    async fn set(&self, next: ModelState) {
        let mut state = self.state.write().await;
        *state = next;
        let label = match &*state {
            ModelState::Unloaded => LifecycleState::Unloaded,
            ModelState::Loading => LifecycleState::Loading,
            ModelState::Ready(_) => LifecycleState::Ready,
        };
        metrics::set_model_state(label.gauge_value());
    }
}
