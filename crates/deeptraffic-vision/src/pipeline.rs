//! Single-frame inference pipelines.
//!
//! `run_detection`: detect, track, normalize.
//! `run_explanation`: saliency, resize to frame, blend, encode.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::codec::{encode_frame, ImageEncoding};
use crate::detector::{DetectParams, ObjectDetector};
use crate::error::{VisionError, VisionResult};
use crate::frame::Frame;
use crate::normalizer::{normalize_detections, DetectionBatch, TrackedDetection};
use crate::overlay::blend_heatmap;
use crate::saliency::SaliencyModel;
use crate::tracker::IoUTracker;

/// Result of [`run_detection`].
#[derive(Debug, Clone)]
pub struct DetectionOutcome {
    pub batch: DetectionBatch,
    /// Detector plus tracker time
    pub inference_time: Duration,
    pub frame_width: u32,
    pub frame_height: u32,
}

/// Options for [`run_explanation`].
#[derive(Debug, Clone, Copy)]
pub struct ExplainOptions {
    /// Class to explain; the classifier's top prediction when `None`
    pub target_class: Option<usize>,
    /// Share of the original frame in the blended overlay
    pub image_weight: f32,
    pub encoding: ImageEncoding,
}

impl Default for ExplainOptions {
    fn default() -> Self {
        Self {
            target_class: None,
            image_weight: 0.5,
            encoding: ImageEncoding::default(),
        }
    }
}

const GATE_PENDING: u8 = 0;
const GATE_COMMITTED: u8 = 1;
const GATE_ABANDONED: u8 = 2;

/// Decides, exactly once, whether a detection job may mutate tracker state
/// or whether its caller has given up on it.
///
/// The job calls [`CommitGate::try_commit`] right before the tracker update;
/// a caller that times out calls [`CommitGate::try_abandon`]. Whichever comes
/// first wins, so a frame whose request failed never advances its stream.
#[derive(Debug, Default)]
pub struct CommitGate {
    state: AtomicU8,
}

impl CommitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the right to update tracker state. False once abandoned.
    pub fn try_commit(&self) -> bool {
        self.transition(GATE_COMMITTED) || self.state.load(Ordering::Acquire) == GATE_COMMITTED
    }

    /// Give up on the job. False if it has already committed, in which case
    /// the caller must wait for its result.
    pub fn try_abandon(&self) -> bool {
        self.transition(GATE_ABANDONED) || self.is_abandoned()
    }

    pub fn is_abandoned(&self) -> bool {
        self.state.load(Ordering::Acquire) == GATE_ABANDONED
    }

    fn transition(&self, to: u8) -> bool {
        self.state
            .compare_exchange(GATE_PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Detect objects in a frame and, when a tracker is given, assign them
/// track ids from that tracker.
///
/// The tracker mutex is held across detection and association, so frames of
/// one stream are processed one at a time, in the order their jobs acquire
/// the lock. Concurrent requests for the same stream are not reordered to
/// match arrival; clients that need strict ordering send a stream's frames
/// sequentially.
///
/// Tracker state is only updated if `gate` commits; an abandoned job returns
/// [`VisionError::Abandoned`] without touching it.
pub fn run_detection(
    detector: &dyn ObjectDetector,
    tracker: Option<&Mutex<IoUTracker>>,
    frame: &Frame,
    params: &DetectParams,
    gate: &CommitGate,
) -> VisionResult<DetectionOutcome> {
    params.validate()?;

    let mut tracker = tracker
        .map(|t| t.lock().map_err(|_| VisionError::internal("Tracker lock poisoned")))
        .transpose()?;
    if gate.is_abandoned() {
        return Err(VisionError::Abandoned);
    }

    let start = Instant::now();
    let detections = detector.detect(frame, params)?;

    if !gate.try_commit() {
        return Err(VisionError::Abandoned);
    }
    let track_ids: Vec<Option<u32>> = match tracker.as_mut() {
        Some(tracker) => tracker.update(&detections).into_iter().map(Some).collect(),
        None => vec![None; detections.len()],
    };
    drop(tracker);
    let inference_time = start.elapsed();

    let tracked: Vec<TrackedDetection> = detections
        .into_iter()
        .zip(track_ids)
        .map(|(detection, track_id)| TrackedDetection {
            detection,
            track_id,
        })
        .collect();

    let batch = normalize_detections(&tracked, frame.width(), frame.height(), detector.class_names());

    Ok(DetectionOutcome {
        batch,
        inference_time,
        frame_width: frame.width(),
        frame_height: frame.height(),
    })
}

/// Produce a base64 heatmap overlay at the frame's resolution.
pub fn run_explanation(
    model: &dyn SaliencyModel,
    frame: &Frame,
    options: &ExplainOptions,
) -> VisionResult<String> {
    let map = model
        .saliency(frame, options.target_class)?
        .resize(frame.width(), frame.height())?;
    let overlay = blend_heatmap(frame, map.values(), options.image_weight)?;
    encode_frame(&overlay, options.encoding)
}
