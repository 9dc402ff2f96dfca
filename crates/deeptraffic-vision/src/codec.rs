//! Base64 image codec.
//!
//! Frames arrive as base64 compressed images (optionally wrapped in a
//! `data:` URL, as produced by browser canvases) and heatmaps leave the
//! same way.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};

use crate::error::{VisionError, VisionResult};
use crate::frame::Frame;

/// Standard alphabet, padding optional.
const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Default JPEG quality for encoded frames.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Output compression for [`encode_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    Jpeg { quality: u8 },
    Png,
}

impl Default for ImageEncoding {
    fn default() -> Self {
        Self::Jpeg {
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Decode a base64 compressed image into an RGB frame.
///
/// Fails with [`VisionError::InvalidFrame`] when the payload is not base64,
/// is empty, is not a decodable image, or exceeds `max_dimension` on either
/// side.
pub fn decode_frame(payload: &str, max_dimension: u32) -> VisionResult<Frame> {
    let payload = strip_data_url(payload.trim());
    let cleaned: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(VisionError::invalid_frame("empty frame payload"));
    }

    let bytes = LENIENT_STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| VisionError::invalid_frame(format!("malformed base64: {}", e)))?;
    if bytes.is_empty() {
        return Err(VisionError::invalid_frame("decoded frame is empty"));
    }

    let image = image::load_from_memory(&bytes)
        .map_err(|e| VisionError::invalid_frame(format!("failed to decode image: {}", e)))?;

    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(VisionError::invalid_frame("image has zero size"));
    }
    if width > max_dimension || height > max_dimension {
        return Err(VisionError::invalid_frame(format!(
            "image is {}x{}, maximum side is {}",
            width, height, max_dimension
        )));
    }

    Ok(Frame::new(image.to_rgb8()))
}

/// Compress a frame and base64-encode it.
pub fn encode_frame(frame: &Frame, encoding: ImageEncoding) -> VisionResult<String> {
    let mut buffer: Vec<u8> = Vec::new();

    match encoding {
        ImageEncoding::Jpeg { quality } => {
            JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
                .encode_image(frame.image())
                .map_err(|e| VisionError::Encode(e.to_string()))?;
        }
        ImageEncoding::Png => {
            PngEncoder::new(&mut buffer)
                .write_image(frame.image().as_raw(), frame.width(), frame.height(), ColorType::Rgb8)
                .map_err(|e| VisionError::Encode(e.to_string()))?;
        }
    }

    Ok(STANDARD.encode(buffer))
}

/// Drop a `data:<mime>;base64,` prefix if present.
fn strip_data_url(payload: &str) -> &str {
    if payload.starts_with("data:") {
        if let Some(idx) = payload.find(',') {
            return &payload[idx + 1..];
        }
    }
    payload
}
