//! IoU-based tracker for maintaining object identity across frames.
//!
//! Uses class-aware greedy matching by Intersection over Union to associate
//! detections with the tracks of the previous frames of one stream.

use std::collections::HashMap;

use crate::bbox::PixelBox;
use crate::detector::RawDetection;

/// Tracker tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    /// Minimum IoU for a detection to continue an existing track
    pub match_iou: f32,
    /// Frames a track survives without a matching detection
    pub max_age: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            match_iou: 0.3,
            max_age: 30,
        }
    }
}

/// Track information.
#[derive(Debug, Clone)]
struct Track {
    /// Last known bounding box
    bbox: PixelBox,
    class_id: u32,
    /// Frames since last detection
    age: u32,
    /// Whether track was matched in the latest frame
    active: bool,
}

/// Simple IoU-based tracker for one video stream.
///
/// Track ids start at 1 and are never reused for the lifetime of the tracker.
pub struct IoUTracker {
    config: TrackerConfig,
    /// Live tracks by id
    tracks: HashMap<u32, Track>,
    /// Next track ID to assign
    next_track_id: u32,
    frames_processed: u64,
}

impl IoUTracker {
    /// Create a new tracker.
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: HashMap::new(),
            next_track_id: 1,
            frames_processed: 0,
        }
    }

    /// Update tracks with the detections of the next frame.
    ///
    /// Returns one track id per detection, in input order.
    pub fn update(&mut self, detections: &[RawDetection]) -> Vec<u32> {
        self.frames_processed += 1;

        let mut assigned: Vec<Option<u32>> = vec![None; detections.len()];
        let mut unmatched_tracks: Vec<u32> = self.tracks.keys().copied().collect();
        unmatched_tracks.sort_unstable();

        // Confident detections claim tracks first
        let mut order: Vec<usize> = (0..detections.len()).collect();
        order.sort_by(|&a, &b| detections[b].confidence.total_cmp(&detections[a].confidence));

        for &det_idx in &order {
            let det = &detections[det_idx];
            let mut best_iou = self.config.match_iou;
            let mut best_track: Option<u32> = None;

            for &track_id in &unmatched_tracks {
                if let Some(track) = self.tracks.get(&track_id) {
                    if track.class_id != det.class_id {
                        continue;
                    }
                    let iou = det.bbox.iou(&track.bbox);
                    if iou > best_iou {
                        best_iou = iou;
                        best_track = Some(track_id);
                    }
                }
            }

            if let Some(track_id) = best_track {
                unmatched_tracks.retain(|&id| id != track_id);
                self.tracks.insert(
                    track_id,
                    Track {
                        bbox: det.bbox,
                        class_id: det.class_id,
                        age: 0,
                        active: true,
                    },
                );
                assigned[det_idx] = Some(track_id);
            }
        }

        // Create new tracks for unmatched detections
        for (det_idx, slot) in assigned.iter_mut().enumerate() {
            if slot.is_some() {
                continue;
            }
            let det = &detections[det_idx];
            let track_id = self.next_track_id;
            self.next_track_id += 1;
            self.tracks.insert(
                track_id,
                Track {
                    bbox: det.bbox,
                    class_id: det.class_id,
                    age: 0,
                    active: true,
                },
            );
            *slot = Some(track_id);
        }

        // Age unmatched tracks
        for track_id in unmatched_tracks {
            let expired = match self.tracks.get_mut(&track_id) {
                Some(track) => {
                    track.age += 1;
                    track.active = false;
                    track.age > self.config.max_age
                }
                None => false,
            };
            if expired {
                self.tracks.remove(&track_id);
            }
        }

        assigned.into_iter().flatten().collect()
    }

    /// Reset the tracker state.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_track_id = 1;
        self.frames_processed = 0;
    }

    /// Get the number of tracks matched in the latest frame.
    pub fn active_track_count(&self) -> usize {
        self.tracks.values().filter(|t| t.active).count()
    }

    /// Number of frames seen since creation or the last reset.
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }
}
