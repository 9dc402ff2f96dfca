//! Application state.

use std::sync::Arc;

use deeptraffic_vision::TrackerRegistry;

use crate::config::ApiConfig;
use crate::lifecycle::ModelLifecycle;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub lifecycle: Arc<ModelLifecycle>,
    pub trackers: Arc<TrackerRegistry>,
}

impl AppState {
    /// Create new application state with models still unloaded.
    pub fn new(config: ApiConfig) -> Self {
        let trackers = TrackerRegistry::new(config.streams.clone());
        Self {
            config: Arc::new(config),
            lifecycle: Arc::new(ModelLifecycle::new()),
            trackers: Arc::new(trackers),
        }
    }
}
