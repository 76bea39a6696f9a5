use super::audio_models::AudioInfo;

/// Which way samples flow between the hardware and the ring buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamDirection {
    Capture,
    Render,
}

/// Immutable snapshot of an opened stream's identity and format.
///
/// Compared by value to decide whether a reconfigure needs to touch hardware.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamParameters {
    pub device_name: String,
    pub device_index: usize,
    pub direction: StreamDirection,
    pub sample_rate: u32,
    pub num_channels: u16,
    pub latency_seconds: f64,
}

impl StreamParameters {
    pub fn audio_info(&self) -> AudioInfo {
        AudioInfo::pcm16(self.sample_rate, self.num_channels)
    }
}
