//! Tracker session payloads.

use serde::{Deserialize, Serialize};

/// Summary of one tracker session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamInfo {
    pub stream_id: String,
    pub active_tracks: usize,
    pub frames_processed: u64,
    pub idle_secs: u64,
}

/// `/api/streams` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamListResponse {
    pub streams: Vec<StreamInfo>,
}
