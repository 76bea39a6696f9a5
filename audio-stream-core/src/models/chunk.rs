use serde::{Deserialize, Serialize};

use super::audio_models::AudioInfo;

/// One timestamped block of audio delivered to a session handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioChunk {
    pub info: AudioInfo,
    /// Per-session, starts at 0 and increases by one per chunk.
    pub sequence_number: u64,
    /// Wall-clock time of the first sample, nanoseconds since the Unix epoch.
    pub start_timestamp_ns: i64,
    /// Wall-clock time one past the last sample.
    pub end_timestamp_ns: i64,
    pub audio_data: Vec<u8>,
}

impl AudioChunk {
    pub fn duration_ns(&self) -> i64 {
        self.end_timestamp_ns - self.start_timestamp_ns
    }
}
