//! Decoded video frame.

use image::{DynamicImage, RgbImage};

/// A decoded 3-channel RGB pixel buffer.
///
/// Frames are transient: one is created per request and dropped once the
/// response has been built.
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Wrap an RGB image.
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// An all-black frame, used for warm-up inference.
    pub fn black(width: u32, height: u32) -> Self {
        Self::new(RgbImage::new(width, height))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Borrow the underlying pixel buffer.
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// View as a `DynamicImage` (copies the buffer).
    pub fn to_dynamic(&self) -> DynamicImage {
        DynamicImage::ImageRgb8(self.image.clone())
    }
}

impl From<RgbImage> for Frame {
    fn from(image: RgbImage) -> Self {
        Self::new(image)
    }
}
