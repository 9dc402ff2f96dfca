//! Heatmap visualisation.

use image::{Rgb, RgbImage};

use crate::error::{VisionError, VisionResult};
use crate::frame::Frame;

/// JET colour map: 0 is dark blue, 0.5 green, 1 dark red.
///
/// Returns RGB components in `[0, 1]`.
pub fn jet_color(value: f32) -> [f32; 3] {
    let v = value.clamp(0.0, 1.0);
    let channel = |offset: f32| (1.5 - (4.0 * v - offset).abs()).clamp(0.0, 1.0);
    [channel(3.0), channel(2.0), channel(1.0)]
}

/// Blend a saliency map over a frame.
///
/// `saliency` holds one value in `[0, 1]` per frame pixel, row major. The
/// map is quantized to 8 bits, coloured with [`jet_color`], mixed with the
/// frame by `image_weight`, and the result is rescaled so its brightest
/// channel is 255.
pub fn blend_heatmap(frame: &Frame, saliency: &[f32], image_weight: f32) -> VisionResult<Frame> {
    let (width, height) = (frame.width(), frame.height());
    if saliency.len() != (width * height) as usize {
        return Err(VisionError::internal(format!(
            "saliency map has {} values, frame has {} pixels",
            saliency.len(),
            width * height
        )));
    }

    let weight = image_weight.clamp(0.0, 1.0);
    let mut mixed: Vec<f32> = Vec::with_capacity(saliency.len() * 3);
    let mut max_value = 0f32;

    for (pixel, &s) in frame.image().pixels().zip(saliency) {
        let quantized = (255.0 * s.clamp(0.0, 1.0)).floor() / 255.0;
        let heat = jet_color(quantized);
        for c in 0..3 {
            let v = (1.0 - weight) * heat[c] + weight * (pixel[c] as f32 / 255.0);
            max_value = max_value.max(v);
            mixed.push(v);
        }
    }

    let scale = if max_value > 0.0 { 1.0 / max_value } else { 0.0 };
    let image = RgbImage::from_fn(width, height, |x, y| {
        let i = ((y * width + x) * 3) as usize;
        Rgb([
            (255.0 * mixed[i] * scale) as u8,
            (255.0 * mixed[i + 1] * scale) as u8,
            (255.0 * mixed[i + 2] * scale) as u8,
        ])
    });

    Ok(Frame::new(image))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jet_endpoints() {
        assert_eq!(jet_color(0.0), [0.0, 0.0, 0.5]);
        assert_eq!(jet_color(0.5), [0.5, 1.0, 0.5]);
        assert_eq!(jet_color(1.0), [0.5, 0.0, 0.0]);
        // Out of range values clamp
        assert_eq!(jet_color(-3.0), jet_color(0.0));
        assert_eq!(jet_color(7.0), jet_color(1.0));
    }

    #[test]
    fn test_blend_keeps_frame_size() {
        let frame = Frame::black(13, 5);
        let saliency = vec![0.25; 13 * 5];
        let blended = blend_heatmap(&frame, &saliency, 0.5).unwrap();
        assert_eq!((blended.width(), blended.height()), (13, 5));
    }

    #[test]
    fn test_blend_is_rescaled_to_full_range() {
        let frame = Frame::black(4, 4);
        let saliency = vec![1.0; 16];
        let blended = blend_heatmap(&frame, &saliency, 0.5).unwrap();
        // Hot pixels on black: red dominates and reaches 255 after rescale
        assert_eq!(blended.image().get_pixel(0, 0).0, [255, 0, 0]);
    }

    #[test]
    fn test_blend_rejects_mismatched_map() {
        let frame = Frame::black(4, 4);
        assert!(blend_heatmap(&frame, &[0.5; 15], 0.5).is_err());
    }
}
