//! Detection records.

use serde::{Deserialize, Serialize};

/// A bounding box in normalized center coordinates.
///
/// All four values are fractions of the frame size in `[0, 1]`, rounded to
/// four decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    /// Normalized x-center
    pub x: f64,
    /// Normalized y-center
    pub y: f64,
    /// Normalized width
    pub width: f64,
    /// Normalized height
    pub height: f64,
}

impl BBox {
    /// Create a new normalized box.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Check that every field lies in `[0, 1]`.
    pub fn is_normalized(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| (0.0..=1.0).contains(v))
    }
}

/// One detected (and possibly tracked) object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Track identifier, stable across frames of one stream; `-1` when untracked.
    pub track_id: i64,
    pub class_name: String,
    pub class_id: u32,
    /// Detector confidence, rounded to four places
    pub confidence: f64,
    pub bbox: BBox,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_normalized() {
        assert!(BBox::new(0.5, 0.5, 1.0, 1.0).is_normalized());
        assert!(BBox::new(0.0, 0.0, 0.0, 0.0).is_normalized());
        assert!(!BBox::new(1.2, 0.5, 0.1, 0.1).is_normalized());
        assert!(!BBox::new(0.5, -0.01, 0.1, 0.1).is_normalized());
    }

    #[test]
    fn test_detection_record_shape() {
        let record = DetectionRecord {
            track_id: -1,
            class_name: "car".to_string(),
            class_id: 2,
            confidence: 0.8731,
            bbox: BBox::new(0.25, 0.5, 0.1, 0.2),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["track_id"], -1);
        assert_eq!(json["class_name"], "car");
        assert_eq!(json["class_id"], 2);
        assert_eq!(json["bbox"]["width"], 0.1);
    }
}
