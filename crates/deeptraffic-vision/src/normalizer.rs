//! Conversion of tracked pixel-space detections into wire records.

use std::collections::BTreeMap;

use deeptraffic_models::{round_to, BBox, DetectionRecord};

use crate::classes::ClassNames;
use crate::detector::RawDetection;

/// Decimal places kept for coordinates and confidences.
const COORD_PLACES: i32 = 4;

/// A detector output with the identity the tracker gave it, if any.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedDetection {
    pub detection: RawDetection,
    pub track_id: Option<u32>,
}

/// Normalized detections for one frame.
///
/// `count_by_class` values always sum to `vehicle_count`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionBatch {
    pub detections: Vec<DetectionRecord>,
    pub vehicle_count: usize,
    pub count_by_class: BTreeMap<String, u32>,
}

/// Normalize absolute `xyxy` boxes by the frame size into center/size
/// fractions rounded to four places, resolve class names and count
/// occurrences per class.
pub fn normalize_detections(
    tracked: &[TrackedDetection],
    frame_width: u32,
    frame_height: u32,
    classes: &ClassNames,
) -> DetectionBatch {
    let w = frame_width.max(1) as f64;
    let h = frame_height.max(1) as f64;

    let mut detections = Vec::with_capacity(tracked.len());
    let mut count_by_class: BTreeMap<String, u32> = BTreeMap::new();

    for item in tracked {
        let b = item.detection.bbox.clip(w as f32, h as f32);
        let (x1, y1, x2, y2) = (b.x1 as f64, b.y1 as f64, b.x2 as f64, b.y2 as f64);

        let bbox = BBox::new(
            round_to(((x1 + x2) / 2.0) / w, COORD_PLACES),
            round_to(((y1 + y2) / 2.0) / h, COORD_PLACES),
            round_to((x2 - x1) / w, COORD_PLACES),
            round_to((y2 - y1) / h, COORD_PLACES),
        );

        let class_id = item.detection.class_id;
        let class_name = classes.resolve(class_id);
        *count_by_class.entry(class_name.clone()).or_insert(0) += 1;

        detections.push(DetectionRecord {
            track_id: item.track_id.map(i64::from).unwrap_or(-1),
            class_name,
            class_id,
            confidence: round_to(item.detection.confidence as f64, COORD_PLACES),
            bbox,
        });
    }

    DetectionBatch {
        vehicle_count: detections.len(),
        detections,
        count_by_class,
    }
}
