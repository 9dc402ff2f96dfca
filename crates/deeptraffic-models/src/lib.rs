//! Shared wire types for the DeepTraffic inference API.
//!
//! This crate provides Serde-serializable types for:
//! - Detection records and normalized bounding boxes
//! - Detect / explain request and response bodies
//! - Health, model-info and stream session payloads

pub mod detect;
pub mod detection;
pub mod explain;
pub mod health;
pub mod streams;

pub use detect::{
    DetectRequest, DetectResponse, DEFAULT_CONF, DEFAULT_IMGSZ, DEFAULT_IOU, DEFAULT_STREAM_ID,
};
pub use detection::{BBox, DetectionRecord};
pub use explain::{ExplainRequest, ExplainResponse};
pub use health::{HealthResponse, ModelInfoResponse};
pub use streams::{StreamInfo, StreamListResponse};

/// Round a value to a fixed number of decimal places.
///
/// Used for every float that crosses the wire so clients see stable values
/// (4 places for coordinates and confidences, 2 for timings).
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
