use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::StreamError;

/// Audio encodings understood by sessions and playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    /// Interleaved little-endian signed 16-bit PCM.
    Pcm16,
    Mp3,
}

impl AudioCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pcm16 => "pcm16",
            Self::Mp3 => "mp3",
        }
    }
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioCodec {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pcm16" => Ok(Self::Pcm16),
            "mp3" => Ok(Self::Mp3),
            other => Err(StreamError::UnsupportedCodec(format!(
                "{} (supported codecs: pcm16, mp3)",
                other
            ))),
        }
    }
}

/// Format of a block of audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioInfo {
    pub codec: AudioCodec,
    pub sample_rate_hz: u32,
    pub num_channels: u16,
}

impl AudioInfo {
    pub fn pcm16(sample_rate_hz: u32, num_channels: u16) -> Self {
        Self {
            codec: AudioCodec::Pcm16,
            sample_rate_hz,
            num_channels,
        }
    }
}

/// Capabilities advertised by a microphone or speaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioProperties {
    pub supported_codecs: Vec<AudioCodec>,
    pub sample_rate_hz: u32,
    pub num_channels: u16,
}

/// Raw capabilities of a device as reported by the audio driver.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub name: String,
    pub max_input_channels: u16,
    pub max_output_channels: u16,
    pub default_sample_rate: f64,
    /// Seconds.
    pub default_low_input_latency: f64,
    /// Seconds.
    pub default_low_output_latency: f64,
}

/// Role of a discovered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Microphone,
    Speaker,
}

/// A device suggested by discovery, ready to be turned into a config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub kind: DeviceKind,
    /// Generated resource name, e.g. `microphone-1`.
    pub name: String,
    pub device_name: String,
    pub sample_rate: u32,
    pub num_channels: u16,
}
