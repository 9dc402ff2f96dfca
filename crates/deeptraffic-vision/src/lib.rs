//! Vision layer for the DeepTraffic inference API.
//!
//! This crate provides:
//! - Base64 frame decoding and encoding
//! - YOLOv8 object detection on ONNX Runtime
//! - Per-stream IoU tracking
//! - Normalization of tracked detections into wire records
//! - Score-CAM saliency maps and heatmap overlays
//!
//! Everything here is synchronous and CPU bound; callers on an async
//! runtime should move calls onto a blocking thread.

pub mod bbox;
pub mod classes;
pub mod codec;
pub mod detector;
pub mod error;
pub mod frame;
pub mod normalizer;
pub mod overlay;
pub mod pipeline;
pub mod saliency;
mod session;
pub mod streams;
pub mod tracker;

pub use bbox::PixelBox;
pub use classes::{ClassNames, COCO_CLASSES};
pub use codec::{decode_frame, encode_frame, ImageEncoding};
pub use detector::{DetectParams, DetectorConfig, ObjectDetector, RawDetection, YoloDetector};
pub use error::{VisionError, VisionResult};
pub use frame::Frame;
pub use normalizer::{normalize_detections, DetectionBatch, TrackedDetection};
pub use overlay::{blend_heatmap, jet_color};
pub use pipeline::{run_detection, run_explanation, CommitGate, DetectionOutcome, ExplainOptions};
pub use saliency::{SaliencyConfig, SaliencyMap, SaliencyModel, ScoreCam};
pub use streams::{StreamSnapshot, TrackerRegistry, TrackerRegistryConfig};
pub use tracker::{IoUTracker, TrackerConfig};

/// Name reported for the tracker in API responses.
pub const TRACKER_NAME: &str = "iou";
