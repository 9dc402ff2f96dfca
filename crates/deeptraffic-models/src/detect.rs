//! Detect endpoint payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::detection::DetectionRecord;

/// Default detector confidence threshold.
pub const DEFAULT_CONF: f32 = 0.4;
/// Default NMS IoU threshold.
pub const DEFAULT_IOU: f32 = 0.5;
/// Default detector input size (square).
pub const DEFAULT_IMGSZ: u32 = 640;
/// Tracker session used when the client does not name one.
pub const DEFAULT_STREAM_ID: &str = "default";

fn default_conf() -> f32 {
    DEFAULT_CONF
}

fn default_iou() -> f32 {
    DEFAULT_IOU
}

fn default_imgsz() -> u32 {
    DEFAULT_IMGSZ
}

fn default_stream_id() -> String {
    DEFAULT_STREAM_ID.to_string()
}

fn default_track() -> bool {
    true
}

/// Base64-encoded video frame for detection and tracking.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectRequest {
    /// Compressed image, base64 (an optional `data:` URL prefix is accepted)
    pub frame: String,
    #[serde(default = "default_conf")]
    pub conf: f32,
    #[serde(default = "default_iou")]
    pub iou: f32,
    #[serde(default = "default_imgsz")]
    pub imgsz: u32,
    /// Tracker session; frames of one video should share a stream id.
    #[serde(default = "default_stream_id")]
    pub stream_id: String,
    /// Set to false to skip the tracker (every `track_id` is then -1).
    #[serde(default = "default_track")]
    pub track: bool,
}

impl DetectRequest {
    /// Build a request with default thresholds.
    pub fn new(frame: impl Into<String>) -> Self {
        Self {
            frame: frame.into(),
            conf: DEFAULT_CONF,
            iou: DEFAULT_IOU,
            imgsz: DEFAULT_IMGSZ,
            stream_id: default_stream_id(),
            track: true,
        }
    }
}

/// Detections for one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectResponse {
    pub detections: Vec<DetectionRecord>,
    /// Number of detections in this frame
    pub vehicle_count: usize,
    /// Occurrences per class name; values sum to `vehicle_count`
    pub count_by_class: BTreeMap<String, u32>,
    pub inference_time_ms: f64,
    pub frame_width: u32,
    pub frame_height: u32,
    pub tracker: String,
    pub stream_id: String,
}
