//! Per-stream tracker sessions.
//!
//! Every logical video stream gets its own [`IoUTracker`] behind its own
//! mutex, so frames from concurrent streams never corrupt each other's
//! track identities and updates within one stream are serialized.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{VisionError, VisionResult};
use crate::tracker::{IoUTracker, TrackerConfig};

/// Longest accepted stream id.
const MAX_STREAM_ID_LEN: usize = 128;

/// Tracker session limits.
#[derive(Debug, Clone)]
pub struct TrackerRegistryConfig {
    pub tracker: TrackerConfig,
    /// Sessions kept in memory; the least recently used is evicted beyond this
    pub max_streams: usize,
    /// Sessions idle longer than this are evicted
    pub idle_ttl: Duration,
}

impl Default for TrackerRegistryConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            max_streams: 64,
            idle_ttl: Duration::from_secs(300),
        }
    }
}

/// Point-in-time view of one session.
#[derive(Debug, Clone)]
pub struct StreamSnapshot {
    pub stream_id: String,
    pub active_tracks: usize,
    pub frames_processed: u64,
    pub idle: Duration,
}

struct StreamEntry {
    tracker: Arc<Mutex<IoUTracker>>,
    last_used: Instant,
}

/// Map from stream id to tracker session.
pub struct TrackerRegistry {
    config: TrackerRegistryConfig,
    streams: Mutex<HashMap<String, StreamEntry>>,
}

impl TrackerRegistry {
    pub fn new(config: TrackerRegistryConfig) -> Self {
        Self {
            config,
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the tracker for a stream.
    pub fn session(&self, stream_id: &str) -> VisionResult<Arc<Mutex<IoUTracker>>> {
        validate_stream_id(stream_id)?;

        let mut streams = self.lock_streams();
        let now = Instant::now();

        if let Some(entry) = streams.get_mut(stream_id) {
            entry.last_used = now;
            return Ok(Arc::clone(&entry.tracker));
        }

        self.evict_expired(&mut streams, now);
        if streams.len() >= self.config.max_streams.max(1) {
            if let Some(oldest) = streams
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(id, _)| id.clone())
            {
                streams.remove(&oldest);
                info!(stream_id = %oldest, "Tracker session limit reached, evicted least recently used stream");
            }
        }

        let tracker = Arc::new(Mutex::new(IoUTracker::new(self.config.tracker)));
        streams.insert(
            stream_id.to_string(),
            StreamEntry {
                tracker: Arc::clone(&tracker),
                last_used: now,
            },
        );
        debug!(stream_id, "Created tracker session");
        Ok(tracker)
    }

    /// Drop a session. Returns false if it did not exist.
    pub fn remove(&self, stream_id: &str) -> bool {
        self.lock_streams().remove(stream_id).is_some()
    }

    /// Drop sessions idle longer than the configured TTL.
    pub fn evict_idle(&self) -> usize {
        let mut streams = self.lock_streams();
        self.evict_expired(&mut streams, Instant::now())
    }

    /// Describe every live session, ordered by stream id.
    pub fn snapshot(&self) -> Vec<StreamSnapshot> {
        let streams = self.lock_streams();
        let now = Instant::now();

        let mut out: Vec<StreamSnapshot> = streams
            .iter()
            .map(|(id, entry)| {
                let tracker = entry.tracker.lock().unwrap_or_else(|e| e.into_inner());
                StreamSnapshot {
                    stream_id: id.clone(),
                    active_tracks: tracker.active_track_count(),
                    frames_processed: tracker.frames_processed(),
                    idle: now.duration_since(entry.last_used),
                }
            })
            .collect();
        out.sort_by(|a, b| a.stream_id.cmp(&b.stream_id));
        out
    }

    pub fn len(&self) -> usize {
        self.lock_streams().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_expired(&self, streams: &mut HashMap<String, StreamEntry>, now: Instant) -> usize {
        let before = streams.len();
        streams.retain(|_, e| now.duration_since(e.last_used) < self.config.idle_ttl);
        let evicted = before - streams.len();
        if evicted > 0 {
            debug!(evicted, "Evicted idle tracker sessions");
        }
        evicted
    }

    // The map holds no invariants that a panicking holder could break.
    fn lock_streams(&self) -> MutexGuard<'_, HashMap<String, StreamEntry>> {
        self.streams.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Stream ids are 1-128 characters of `[A-Za-z0-9._:-]`.
pub fn validate_stream_id(stream_id: &str) -> VisionResult<()> {
    let valid = !stream_id.is_empty()
        && stream_id.len() <= MAX_STREAM_ID_LEN
        && stream_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));
    if valid {
        Ok(())
    } else {
        Err(VisionError::invalid_parameter(format!(
            "stream_id must be 1-{} characters of [A-Za-z0-9._:-]",
            MAX_STREAM_ID_LEN
        )))
    }
}
