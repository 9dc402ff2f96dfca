//! API configuration.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use deeptraffic_vision::{DetectorConfig, SaliencyConfig, TrackerConfig, TrackerRegistryConfig};

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second, per client IP
    pub rate_limit_rps: u32,
    /// Upper bound on a single inference call
    pub inference_timeout: Duration,
    /// Max request body size
    pub max_body_size: usize,
    /// Decoded frames larger than this on either side are rejected
    pub max_frame_dimension: u32,
    /// Environment (development/production)
    pub environment: String,
    /// Expose Prometheus metrics at `/metrics`
    pub metrics_enabled: bool,
    pub detector: DetectorConfig,
    pub saliency: SaliencyConfig,
    /// Share of the original frame in heatmap overlays
    pub heatmap_image_weight: f32,
    pub streams: TrackerRegistryConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 30,
            inference_timeout: Duration::from_secs(30),
            max_body_size: 20 * 1024 * 1024, // 20MB
            max_frame_dimension: 4096,
            environment: "development".to_string(),
            metrics_enabled: true,
            detector: DetectorConfig::default(),
            saliency: SaliencyConfig::default(),
            heatmap_image_weight: 0.5,
            streams: TrackerRegistryConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let tracker_defaults = TrackerConfig::default();

        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT", defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: env_parse("RATE_LIMIT_RPS", defaults.rate_limit_rps),
            inference_timeout: Duration::from_secs(env_parse(
                "INFERENCE_TIMEOUT",
                defaults.inference_timeout.as_secs(),
            )),
            max_body_size: env_parse("MAX_BODY_SIZE", defaults.max_body_size),
            max_frame_dimension: env_parse("MAX_FRAME_DIMENSION", defaults.max_frame_dimension),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            metrics_enabled: env_flag("METRICS_ENABLED", defaults.metrics_enabled),
            detector: DetectorConfig {
                model_path: env_path("DETECTOR_MODEL_PATH", defaults.detector.model_path),
                labels_path: std::env::var("DETECTOR_LABELS_PATH").ok().map(PathBuf::from),
                input_size: env_parse("DETECTOR_INPUT_SIZE", defaults.detector.input_size),
                dynamic_input: env_flag("DETECTOR_DYNAMIC_INPUT", defaults.detector.dynamic_input),
                max_detections: env_parse("DETECTOR_MAX_DETECTIONS", defaults.detector.max_detections),
            },
            saliency: SaliencyConfig {
                model_path: env_path("EXPLAIN_MODEL_PATH", defaults.saliency.model_path),
                top_k: env_parse("EXPLAIN_TOP_K", defaults.saliency.top_k),
                ..defaults.saliency
            },
            heatmap_image_weight: env_parse("HEATMAP_IMAGE_WEIGHT", defaults.heatmap_image_weight),
            streams: TrackerRegistryConfig {
                tracker: TrackerConfig {
                    match_iou: env_parse("TRACKER_MATCH_IOU", tracker_defaults.match_iou),
                    max_age: env_parse("TRACKER_MAX_AGE", tracker_defaults.max_age),
                },
                max_streams: env_parse("MAX_STREAMS", defaults.streams.max_streams),
                idle_ttl: Duration::from_secs(env_parse(
                    "STREAM_IDLE_TTL",
                    defaults.streams.idle_ttl.as_secs(),
                )),
            },
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    /// Resolve model paths against the working directory and check that the
    /// weight files exist. Called once at startup; an error is fatal.
    pub fn resolve_model_paths(&mut self) -> Result<(), String> {
        self.detector.model_path = resolve_existing(&self.detector.model_path, "detector weights")?;
        self.saliency.model_path = resolve_existing(&self.saliency.model_path, "explainability weights")?;
        if let Some(labels) = &self.detector.labels_path {
            self.detector.labels_path = Some(resolve_existing(labels, "detector labels")?);
        }
        Ok(())
    }

    /// File name of the detector weights, as reported by `/api/health`.
    pub fn model_file_name(&self) -> String {
        file_component(&self.detector.model_path, |p| p.file_name())
    }

    /// Weights file stem, as reported by `/api/model-info`.
    pub fn model_name(&self) -> String {
        file_component(&self.detector.model_path, |p| p.file_stem())
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

fn resolve_existing(path: &Path, what: &str) -> Result<PathBuf, String> {
    path.canonicalize()
        .map_err(|e| format!("{} not found at {}: {}", what, path.display(), e))
}

fn file_component<'a>(
    path: &'a Path,
    pick: impl Fn(&'a Path) -> Option<&'a std::ffi::OsStr>,
) -> String {
    pick(path)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
