//! Saliency maps for the explainability endpoint.
//!
//! [`ScoreCam`] runs Score-CAM on an ONNX image classifier. Score-CAM only
//! needs forward passes, so it works on an inference runtime without
//! gradients: each selected activation channel is upsampled into a mask, the
//! masked input is scored by the target class logit, and the softmax of
//! those scores weights the channels into the final map.

use std::path::PathBuf;
use std::sync::Mutex;

use image::imageops::FilterType;
use image::{ImageBuffer, Luma};
use ndarray::{Array2, Array3, Axis};
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use crate::error::{VisionError, VisionResult};
use crate::frame::Frame;
use crate::session::create_session;

/// Added to normalisation denominators.
const EPSILON: f32 = 1e-7;

/// A single-channel map with values in `[0, 1]`, row major.
#[derive(Debug, Clone, PartialEq)]
pub struct SaliencyMap {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl SaliencyMap {
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> VisionResult<Self> {
        if values.len() != (width * height) as usize {
            return Err(VisionError::internal(format!(
                "saliency map of {}x{} needs {} values, got {}",
                width,
                height,
                width * height,
                values.len()
            )));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Bilinear resize, e.g. from model resolution up to the frame size.
    pub fn resize(&self, width: u32, height: u32) -> VisionResult<SaliencyMap> {
        let values = resize_plane(&self.values, self.width, self.height, width, height)?;
        SaliencyMap::new(width, height, values)
    }
}

/// Explainability contract consumed by the request pipeline.
pub trait SaliencyModel: Send + Sync {
    /// Compute a saliency map at the model's input resolution for
    /// `target_class`, or for the top predicted class when `None`.
    fn saliency(&self, frame: &Frame, target_class: Option<usize>) -> VisionResult<SaliencyMap>;

    /// Method and backbone, for logs.
    fn name(&self) -> &str;

    /// Run one throwaway forward pass.
    fn warm_up(&self) -> VisionResult<()>;
}

/// Configuration for [`ScoreCam`].
#[derive(Debug, Clone)]
pub struct SaliencyConfig {
    /// Path to ONNX classifier exporting activations and logits
    pub model_path: PathBuf,
    /// Square classifier input size
    pub input_size: u32,
    /// Activation channels scored per request
    pub top_k: usize,
    /// Output holding the last convolutional activations `[1, C, h, w]`
    pub features_output: String,
    /// Output holding class logits `[1, K]`
    pub logits_output: String,
}

impl Default for SaliencyConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/mobilenet_v3_small_cam.onnx"),
            input_size: 224,
            top_k: 32,
            features_output: "features".to_string(),
            logits_output: "logits".to_string(),
        }
    }
}

/// Score-CAM over an ONNX classifier.
pub struct ScoreCam {
    session: Mutex<Session>,
    config: SaliencyConfig,
}

impl ScoreCam {
    pub fn new(config: SaliencyConfig) -> VisionResult<Self> {
        let session = create_session(&config.model_path, "explainability")?;
        info!(
            model_path = %config.model_path.display(),
            input_size = config.input_size,
            top_k = config.top_k,
            "Score-CAM explainability model initialized"
        );
        Ok(Self {
            session: Mutex::new(session),
            config,
        })
    }

    /// RGB, scaled to `[0, 1]`, resized to the classifier input, CHW.
    fn preprocess(&self, frame: &Frame) -> Vec<f32> {
        let size = self.config.input_size;
        let float_image = frame.to_dynamic().to_rgb32f();
        let resized = image::imageops::resize(&float_image, size, size, FilterType::Triangle);

        let plane = (size * size) as usize;
        let mut chw = vec![0f32; 3 * plane];
        for (i, pixel) in resized.pixels().enumerate() {
            for c in 0..3 {
                chw[c * plane + i] = pixel[c];
            }
        }
        chw
    }

    /// Run the classifier, returning activations `[C, h, w]` and logits.
    fn forward(&self, input: &[f32]) -> VisionResult<(Array3<f32>, Vec<f32>)> {
        let size = self.config.input_size as usize;
        let tensor: Value = Tensor::from_array((vec![1usize, 3, size, size], input.to_vec().into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| VisionError::inference(format!("Failed to create tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| VisionError::internal("Explainability session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| VisionError::inference(format!("ONNX inference failed: {}", e)))?;

        let features = outputs
            .get(self.config.features_output.as_str())
            .ok_or_else(|| {
                VisionError::inference(format!("Missing {} tensor", self.config.features_output))
            })?;
        let (shape, data) = features
            .try_extract_tensor::<f32>()
            .map_err(|e| VisionError::inference(format!("Failed to extract activations: {}", e)))?;
        let dims: Vec<i64> = shape.iter().copied().collect();
        if dims.len() != 4 || dims[0] != 1 {
            return Err(VisionError::inference(format!(
                "Unexpected activation shape {:?}, expected [1, C, h, w]",
                dims
            )));
        }
        let activations = Array3::from_shape_vec(
            (dims[1] as usize, dims[2] as usize, dims[3] as usize),
            data.to_vec(),
        )
        .map_err(|e| VisionError::inference(format!("Failed to reshape activations: {}", e)))?;

        let logits = outputs
            .get(self.config.logits_output.as_str())
            .ok_or_else(|| {
                VisionError::inference(format!("Missing {} tensor", self.config.logits_output))
            })?;
        let (_, logit_data) = logits
            .try_extract_tensor::<f32>()
            .map_err(|e| VisionError::inference(format!("Failed to extract logits: {}", e)))?;

        Ok((activations, logit_data.to_vec()))
    }
}

impl SaliencyModel for ScoreCam {
    fn saliency(&self, frame: &Frame, target_class: Option<usize>) -> VisionResult<SaliencyMap> {
        let size = self.config.input_size;
        let input = self.preprocess(frame);
        let (activations, logits) = self.forward(&input)?;

        let target = select_target(&logits, target_class)?;

        let (_, fh, fw) = activations.dim();
        let channels = top_channels(&activations, self.config.top_k);
        let plane = (size * size) as usize;

        let mut scores = Vec::with_capacity(channels.len());
        for &k in &channels {
            // Normalize before resizing: float resampling clamps to [0, 1]
            let mut activation: Vec<f32> =
                activations.index_axis(Axis(0), k).iter().copied().collect();
            min_max_normalize(&mut activation);
            let mask = resize_plane(&activation, fw as u32, fh as u32, size, size)?;

            let masked: Vec<f32> = input
                .iter()
                .enumerate()
                .map(|(i, v)| v * mask[i % plane])
                .collect();
            let (_, masked_logits) = self.forward(&masked)?;
            scores.push(masked_logits.get(target).copied().unwrap_or(0.0));
        }

        let weights = softmax(&scores);
        let weighted: Vec<(usize, f32)> = channels.into_iter().zip(weights).collect();
        let cam = weighted_cam(&activations, &weighted);

        let mut values: Vec<f32> = cam.iter().copied().collect();
        min_max_normalize(&mut values);
        let map = SaliencyMap::new(fw as u32, fh as u32, values)?.resize(size, size)?;

        debug!(target, channels = weighted.len(), "Score-CAM map computed");
        Ok(map)
    }

    fn name(&self) -> &str {
        "score-cam"
    }

    fn warm_up(&self) -> VisionResult<()> {
        let size = self.config.input_size as usize;
        self.forward(&vec![0f32; 3 * size * size]).map(|_| ())
    }
}

/// The class to explain: `requested` if the classifier has it, otherwise
/// the top-scoring class. A requested class past the end of `logits` is a
/// client error.
pub fn select_target(logits: &[f32], requested: Option<usize>) -> VisionResult<usize> {
    match requested {
        Some(class) if class < logits.len() => Ok(class),
        Some(class) => Err(VisionError::invalid_parameter(format!(
            "target_class {} is outside the classifier's {} classes",
            class,
            logits.len()
        ))),
        None => argmax(logits).ok_or_else(|| VisionError::inference("Classifier returned no logits")),
    }
}

/// Index of the largest value.
pub fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

/// Numerically stable softmax.
pub fn softmax(values: &[f32]) -> Vec<f32> {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = values.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum > 0.0 {
        exps.into_iter().map(|e| e / sum).collect()
    } else {
        vec![0.0; values.len()]
    }
}

/// The `k` channels with the highest mean activation, strongest first.
pub fn top_channels(activations: &Array3<f32>, k: usize) -> Vec<usize> {
    let mut means: Vec<(usize, f32)> = activations
        .outer_iter()
        .enumerate()
        .map(|(c, plane)| (c, plane.mean().unwrap_or(0.0)))
        .collect();
    means.sort_by(|a, b| b.1.total_cmp(&a.1));
    means.into_iter().take(k.max(1)).map(|(c, _)| c).collect()
}

/// `ReLU(sum_k w_k * A_k)` over the selected channels.
pub fn weighted_cam(activations: &Array3<f32>, weights: &[(usize, f32)]) -> Array2<f32> {
    let (_, h, w) = activations.dim();
    let mut cam = Array2::<f32>::zeros((h, w));
    for &(channel, weight) in weights {
        cam.scaled_add(weight, &activations.index_axis(Axis(0), channel));
    }
    cam.mapv_inplace(|v| v.max(0.0));
    cam
}

/// Shift to zero minimum and scale to unit maximum, in place.
pub fn min_max_normalize(values: &mut [f32]) {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !min.is_finite() || !max.is_finite() {
        return;
    }
    let range = max - min + EPSILON;
    for v in values.iter_mut() {
        *v = (*v - min) / range;
    }
}

/// Bilinear resize of a single float plane.
fn resize_plane(
    values: &[f32],
    width: u32,
    height: u32,
    new_width: u32,
    new_height: u32,
) -> VisionResult<Vec<f32>> {
    if width == new_width && height == new_height {
        return Ok(values.to_vec());
    }
    let plane: ImageBuffer<Luma<f32>, Vec<f32>> = ImageBuffer::from_raw(width, height, values.to_vec())
        .ok_or_else(|| VisionError::internal("saliency plane does not match its size"))?;
    Ok(image::imageops::resize(&plane, new_width, new_height, FilterType::Triangle).into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_sums_to_one() {
        let out = softmax(&[1.0, 2.0, 3.0]);
        assert!((out.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(out[2] > out[1] && out[1] > out[0]);

        // Large logits do not overflow
        let out = softmax(&[1000.0, 1000.0]);
        assert!((out[0] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_select_target_prefers_requested_class() {
        let logits = [0.1, 3.0, -2.0];
        assert_eq!(select_target(&logits, Some(2)).unwrap(), 2);
        assert_eq!(select_target(&logits, Some(0)).unwrap(), 0);
    }

    #[test]
    fn test_select_target_defaults_to_top_prediction() {
        assert_eq!(select_target(&[0.1, 3.0, -2.0], None).unwrap(), 1);
    }

    #[test]
    fn test_select_target_out_of_range_is_client_error() {
        let err = select_target(&[0.1, 3.0, -2.0], Some(3)).unwrap_err();
        assert!(err.is_client_error());
        assert!(err.to_string().contains("target_class 3"));
    }

    #[test]
    fn test_select_target_without_logits() {
        let err = select_target(&[], None).unwrap_err();
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[0.1, 3.0, -2.0]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_top_channels_orders_by_mean() {
        let mut a = Array3::<f32>::zeros((3, 2, 2));
        a.index_axis_mut(Axis(0), 0).fill(0.5);
        a.index_axis_mut(Axis(0), 1).fill(2.0);
        a.index_axis_mut(Axis(0), 2).fill(1.0);

        assert_eq!(top_channels(&a, 2), vec![1, 2]);
        assert_eq!(top_channels(&a, 10), vec![1, 2, 0]);
    }

    #[test]
    fn test_weighted_cam_applies_relu() {
        let mut a = Array3::<f32>::zeros((2, 1, 2));
        a[[0, 0, 0]] = 1.0;
        a[[1, 0, 1]] = -4.0;

        let cam = weighted_cam(&a, &[(0, 0.5), (1, 0.5)]);
        assert_eq!(cam[[0, 0]], 0.5);
        assert_eq!(cam[[0, 1]], 0.0);
    }

    #[test]
    fn test_min_max_normalize() {
        let mut values = vec![2.0, 4.0, 6.0];
        min_max_normalize(&mut values);
        assert!(values[0].abs() < 1e-6);
        assert!((values[1] - 0.5).abs() < 1e-5);
        assert!((values[2] - 1.0).abs() < 1e-5);

        let mut flat = vec![3.0; 4];
        min_max_normalize(&mut flat);
        assert!(flat.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_map_resize_up() {
        let map = SaliencyMap::new(2, 2, vec![0.0, 1.0, 0.0, 1.0]).unwrap();
        let big = map.resize(64, 48).unwrap();
        assert_eq!((big.width(), big.height()), (64, 48));
        assert_eq!(big.values().len(), 64 * 48);
        assert!(big.values().iter().all(|v| (-1e-4..=1.0 + 1e-4).contains(v)));
    }

    #[test]
    fn test_map_size_checked() {
        assert!(SaliencyMap::new(3, 3, vec![0.0; 8]).is_err());
    }
}
