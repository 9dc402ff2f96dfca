//! Class id to class name table.

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;

use crate::error::{VisionError, VisionResult};

/// COCO class names (80 classes).
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck",
    "boat", "traffic light", "fire hydrant", "stop sign", "parking meter", "bench",
    "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra",
    "giraffe", "backpack", "umbrella", "handbag", "tie", "suitcase", "frisbee",
    "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove",
    "skateboard", "surfboard", "tennis racket", "bottle", "wine glass", "cup",
    "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
    "toothbrush",
];

/// Mapping from detector class id to human-readable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassNames {
    names: BTreeMap<u32, String>,
}

impl ClassNames {
    pub fn new(names: BTreeMap<u32, String>) -> Self {
        Self { names }
    }

    /// The 80 COCO classes.
    pub fn coco() -> Self {
        Self::from_list(COCO_CLASSES.iter().map(|s| s.to_string()))
    }

    /// Build from names ordered by class id.
    pub fn from_list(names: impl IntoIterator<Item = String>) -> Self {
        Self::new(
            names
                .into_iter()
                .enumerate()
                .map(|(id, name)| (id as u32, name))
                .collect(),
        )
    }

    /// Load a labels file with one class name per line. Blank lines are skipped.
    pub fn from_labels_file(path: &Path) -> VisionResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let names: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        if names.is_empty() {
            return Err(VisionError::internal(format!(
                "labels file {} contains no class names",
                path.display()
            )));
        }
        Ok(Self::from_list(names))
    }

    /// Parse the `names` metadata entry written by the YOLOv8 ONNX exporter,
    /// e.g. `{0: 'car', 1: 'motorcycle'}`. Returns `None` when nothing parses.
    pub fn from_export_metadata(raw: &str) -> Option<Self> {
        let pattern = Regex::new(r#"(\d+)\s*:\s*(?:'([^']*)'|"([^"]*)")"#).ok()?;
        let names: BTreeMap<u32, String> = pattern
            .captures_iter(raw)
            .filter_map(|caps| {
                let id = caps.get(1)?.as_str().parse().ok()?;
                let name = caps.get(2).or_else(|| caps.get(3))?.as_str().to_string();
                Some((id, name))
            })
            .collect();

        if names.is_empty() {
            None
        } else {
            Some(Self::new(names))
        }
    }

    /// Resolve a class id, synthesizing `class_{id}` for unknown ids.
    pub fn resolve(&self, class_id: u32) -> String {
        self.names
            .get(&class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Borrow the underlying table.
    pub fn as_map(&self) -> &BTreeMap<u32, String> {
        &self.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_coco_classes() {
        let names = ClassNames::coco();
        assert_eq!(names.len(), 80);
        assert_eq!(names.resolve(0), "person");
        assert_eq!(names.resolve(2), "car");
    }

    #[test]
    fn test_unknown_class_synthesized() {
        let names = ClassNames::from_list(vec!["car".to_string()]);
        assert_eq!(names.resolve(0), "car");
        assert_eq!(names.resolve(7), "class_7");
    }

    #[test]
    fn test_export_metadata_parsing() {
        let names =
            ClassNames::from_export_metadata("{0: 'car', 1: 'motorcycle', 2: \"bus\", 3: 'truck'}")
                .unwrap();
        assert_eq!(names.len(), 4);
        assert_eq!(names.resolve(1), "motorcycle");
        assert_eq!(names.resolve(2), "bus");

        assert!(ClassNames::from_export_metadata("garbage").is_none());
    }

    #[test]
    fn test_labels_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "car\n\nbus\n  truck  ").unwrap();

        let names = ClassNames::from_labels_file(file.path()).unwrap();
        assert_eq!(names.len(), 3);
        assert_eq!(names.resolve(2), "truck");
    }

    #[test]
    fn test_empty_labels_file_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(ClassNames::from_labels_file(file.path()).is_err());
    }
}
