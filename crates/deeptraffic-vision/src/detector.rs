//! Object detection using a YOLOv8 ONNX export.
//!
//! The detector is the model half of the Detection/Tracking Service: it
//! turns a frame into absolute-pixel boxes with class ids and confidences.
//! Identity across frames is assigned afterwards by [`crate::tracker`].

use std::path::PathBuf;
use std::sync::Mutex;

use deeptraffic_models::{DEFAULT_CONF, DEFAULT_IMGSZ, DEFAULT_IOU};
use image::imageops::FilterType;
use ndarray::Array;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info, warn};

use crate::bbox::PixelBox;
use crate::classes::ClassNames;
use crate::error::{VisionError, VisionResult};
use crate::frame::Frame;
use crate::session::{create_session, custom_metadata};

/// Name of the YOLOv8 prediction output.
const OUTPUT_NAME: &str = "output0";
/// Smallest accepted input size.
const MIN_INPUT_SIZE: u32 = 32;
/// Largest accepted input size.
const MAX_INPUT_SIZE: u32 = 1920;

/// A single detection in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub bbox: PixelBox,
    pub class_id: u32,
    pub confidence: f32,
}

/// Per-request detection thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectParams {
    /// Minimum class score to keep a candidate
    pub confidence_threshold: f32,
    /// IoU above which a lower-scoring box of the same class is suppressed
    pub iou_threshold: f32,
    /// Square model input size
    pub input_size: u32,
}

impl Default for DetectParams {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONF,
            iou_threshold: DEFAULT_IOU,
            input_size: DEFAULT_IMGSZ,
        }
    }
}

impl DetectParams {
    pub fn new(confidence_threshold: f32, iou_threshold: f32, input_size: u32) -> Self {
        Self {
            confidence_threshold,
            iou_threshold,
            input_size,
        }
    }

    /// Reject thresholds outside `[0, 1]` and input sizes the network cannot
    /// take (not a multiple of 32, or outside `[32, 1920]`).
    pub fn validate(&self) -> VisionResult<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(VisionError::invalid_parameter(format!(
                "conf must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(VisionError::invalid_parameter(format!(
                "iou must be within [0, 1], got {}",
                self.iou_threshold
            )));
        }
        if self.input_size < MIN_INPUT_SIZE
            || self.input_size > MAX_INPUT_SIZE
            || self.input_size % 32 != 0
        {
            return Err(VisionError::invalid_parameter(format!(
                "imgsz must be a multiple of 32 within [{}, {}], got {}",
                MIN_INPUT_SIZE, MAX_INPUT_SIZE, self.input_size
            )));
        }
        Ok(())
    }
}

/// Detector contract consumed by the request pipeline.
pub trait ObjectDetector: Send + Sync {
    /// Detect objects in a frame. An empty result is not an error.
    fn detect(&self, frame: &Frame, params: &DetectParams) -> VisionResult<Vec<RawDetection>>;

    /// Class id to name table of the loaded model.
    fn class_names(&self) -> &ClassNames;

    /// Native input size of the model.
    fn input_size(&self) -> u32;

    /// Model family reported by `/api/model-info`.
    fn model_type(&self) -> &str {
        "YOLOv8"
    }

    /// Run one throwaway inference so lazy initialization happens before
    /// the first real request.
    fn warm_up(&self) -> VisionResult<()> {
        let size = self.input_size();
        let params = DetectParams {
            input_size: size,
            ..DetectParams::default()
        };
        self.detect(&Frame::black(size, size), &params).map(|_| ())
    }
}

/// Configuration for the YOLOv8 detector.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Path to ONNX model file
    pub model_path: PathBuf,
    /// Optional class names file, one per line
    pub labels_path: Option<PathBuf>,
    /// Input size the model was exported with
    pub input_size: u32,
    /// Whether the export accepts other input sizes
    pub dynamic_input: bool,
    /// Upper bound on detections kept after NMS
    pub max_detections: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/best.onnx"),
            labels_path: None,
            input_size: DEFAULT_IMGSZ,
            dynamic_input: false,
            max_detections: 300,
        }
    }
}

/// YOLOv8 detector on ONNX Runtime.
pub struct YoloDetector {
    session: Mutex<Session>,
    config: DetectorConfig,
    class_names: ClassNames,
}

impl YoloDetector {
    /// Load the model and resolve its class table.
    ///
    /// Returns error if model file doesn't exist or cannot be loaded.
    pub fn new(config: DetectorConfig) -> VisionResult<Self> {
        let session = create_session(&config.model_path, "detector")?;

        let class_names = match &config.labels_path {
            Some(path) => ClassNames::from_labels_file(path)?,
            None => custom_metadata(&session, "names")
                .and_then(|raw| ClassNames::from_export_metadata(&raw))
                .unwrap_or_else(|| {
                    warn!("Model carries no class names, falling back to COCO");
                    ClassNames::coco()
                }),
        };

        info!(
            model_path = %config.model_path.display(),
            input_size = config.input_size,
            num_classes = class_names.len(),
            "Object detector initialized"
        );

        Ok(Self {
            session: Mutex::new(session),
            config,
            class_names,
        })
    }

    /// Static exports only take their native size; other requested sizes
    /// fall back to it.
    fn effective_input_size(&self, requested: u32) -> u32 {
        if self.config.dynamic_input || requested == self.config.input_size {
            requested
        } else {
            debug!(
                requested,
                native = self.config.input_size,
                "Model has a static input size, ignoring requested imgsz"
            );
            self.config.input_size
        }
    }

    /// Resize to `size x size`, scale to `[0, 1]`, lay out as NCHW.
    fn preprocess(&self, frame: &Frame, size: u32) -> VisionResult<Value> {
        let resized = image::imageops::resize(frame.image(), size, size, FilterType::Triangle);
        let plane = (size * size) as usize;
        let mut chw_data = vec![0f32; 3 * plane];

        for (i, pixel) in resized.pixels().enumerate() {
            for c in 0..3 {
                chw_data[c * plane + i] = pixel[c] as f32 / 255.0;
            }
        }

        let shape = vec![1usize, 3, size as usize, size as usize];
        Tensor::from_array((shape, chw_data.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| VisionError::inference(format!("Failed to create tensor: {}", e)))
    }

    /// Run ONNX inference, returning the output shape and values.
    fn run_inference(&self, input: Value) -> VisionResult<(Vec<i64>, Vec<f32>)> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| VisionError::internal("Detector session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| VisionError::inference(format!("ONNX inference failed: {}", e)))?;

        let output = outputs
            .get(OUTPUT_NAME)
            .ok_or_else(|| VisionError::inference("Missing output0 tensor"))?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| VisionError::inference(format!("Failed to extract tensor: {}", e)))?;

        Ok((shape.iter().copied().collect(), data.to_vec()))
    }
}

impl ObjectDetector for YoloDetector {
    fn detect(&self, frame: &Frame, params: &DetectParams) -> VisionResult<Vec<RawDetection>> {
        params.validate()?;
        let size = self.effective_input_size(params.input_size);

        let input = self.preprocess(frame, size)?;
        let (dims, output) = self.run_inference(input)?;

        let candidates = decode_predictions(
            &output,
            &dims,
            size,
            frame.width(),
            frame.height(),
            params.confidence_threshold,
        )?;
        let detections =
            non_maximum_suppression(candidates, params.iou_threshold, self.config.max_detections);

        debug!(count = detections.len(), "Object detection completed");
        Ok(detections)
    }

    fn class_names(&self) -> &ClassNames {
        &self.class_names
    }

    fn input_size(&self) -> u32 {
        self.config.input_size
    }
}

/// Decode a YOLOv8 prediction tensor.
///
/// Layout is `[1, 4 + num_classes, num_candidates]`; the first four rows are
/// the box center, width and height in model input pixels, the rest are
/// per-class scores. Boxes are scaled to frame pixels and clipped to the
/// frame.
pub fn decode_predictions(
    output: &[f32],
    dims: &[i64],
    input_size: u32,
    frame_width: u32,
    frame_height: u32,
    confidence_threshold: f32,
) -> VisionResult<Vec<RawDetection>> {
    if dims.len() != 3 || dims[0] != 1 || dims[1] <= 4 {
        return Err(VisionError::inference(format!(
            "Unexpected output shape {:?}, expected [1, 4 + classes, candidates]",
            dims
        )));
    }
    let num_features = dims[1] as usize;
    let num_boxes = dims[2] as usize;
    let num_classes = num_features - 4;

    if output.len() != num_features * num_boxes {
        return Err(VisionError::inference(format!(
            "Unexpected output size: expected {}, got {}",
            num_features * num_boxes,
            output.len()
        )));
    }

    // [features, boxes] -> [boxes, features]
    let output_array = Array::from_shape_vec((num_features, num_boxes), output.to_vec())
        .map_err(|e| VisionError::inference(format!("Failed to reshape output: {}", e)))?;
    let transposed = output_array.t();

    let scale_x = frame_width as f32 / input_size as f32;
    let scale_y = frame_height as f32 / input_size as f32;
    let (max_x, max_y) = (frame_width as f32, frame_height as f32);

    let mut candidates = Vec::new();
    for i in 0..num_boxes {
        let mut best_class = 0;
        let mut best_score = f32::MIN;
        for c in 0..num_classes {
            let score = transposed[[i, 4 + c]];
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }

        if best_score < confidence_threshold {
            continue;
        }

        let bbox = PixelBox::from_center(
            transposed[[i, 0]] * scale_x,
            transposed[[i, 1]] * scale_y,
            transposed[[i, 2]] * scale_x,
            transposed[[i, 3]] * scale_y,
        )
        .clip(max_x, max_y);

        if bbox.area() <= 0.0 {
            continue;
        }

        candidates.push(RawDetection {
            bbox,
            class_id: best_class as u32,
            confidence: best_score,
        });
    }

    Ok(candidates)
}

/// Class-aware Non-Maximum Suppression.
///
/// Returns at most `max_detections` boxes, highest confidence first.
pub fn non_maximum_suppression(
    mut detections: Vec<RawDetection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<RawDetection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<RawDetection> = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i]);
        if keep.len() >= max_detections {
            break;
        }

        for j in (i + 1)..detections.len() {
            if suppressed[j] || detections[i].class_id != detections[j].class_id {
                continue;
            }
            if detections[i].bbox.iou(&detections[j].bbox) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}
