use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::StreamError;

/// Seconds of audio history kept in every stream ring buffer.
pub const BUFFER_DURATION_SECONDS: f64 = 10.0;

/// Duration of one PCM chunk handed to a session handler.
pub const CHUNK_DURATION_SECONDS: f64 = 0.1;

/// How long a session sleeps when less than one chunk is buffered.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// User-facing attributes for a microphone or speaker.
///
/// Every field is optional; missing values are resolved against the audio
/// driver when the stream opens (see [`crate::device::resolve`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Exact device name, or None for the host default device.
    pub device_name: Option<String>,

    /// Sample rate in Hz, or None for the device default.
    pub sample_rate: Option<u32>,

    /// Channel count (default: 1).
    pub num_channels: Option<u16>,

    /// Suggested latency in milliseconds; 0 or None selects the device's
    /// default low latency.
    pub latency: Option<f64>,
}

impl StreamConfig {
    /// Parse attributes from a JSON object.
    pub fn from_json(json: &str) -> Result<Self, StreamError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| StreamError::ConfigurationFailed(format!("invalid attributes: {}", e)))?;
        config.validate().map_err(StreamError::ConfigurationFailed)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == Some(0) {
            return Err("sample rate must be greater than zero".into());
        }
        if self.num_channels == Some(0) {
            return Err("num_channels must be greater than zero".into());
        }
        if let Some(latency) = self.latency {
            if !latency.is_finite() || latency < 0.0 {
                return Err("latency must be non-negative".into());
            }
        }
        Ok(())
    }

    /// Requested latency converted to seconds. Zero means "device default".
    pub fn latency_seconds(&self) -> f64 {
        self.latency.map(|ms| ms / 1000.0).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_config_is_valid() {
        assert!(StreamConfig::default().validate().is_ok());
    }

    #[test]
    fn parses_all_attributes() {
        let config = StreamConfig::from_json(
            r#"{"device_name": "USB Mic", "sample_rate": 44100, "num_channels": 2, "latency": 20}"#,
        )
        .unwrap();

        assert_eq!(config.device_name.as_deref(), Some("USB Mic"));
        assert_eq!(config.sample_rate, Some(44100));
        assert_eq!(config.num_channels, Some(2));
        assert_relative_eq!(config.latency_seconds(), 0.02);
    }

    #[test]
    fn missing_attributes_fall_back_to_none() {
        let config = StreamConfig::from_json("{}").unwrap();
        assert_eq!(config, StreamConfig::default());
        assert_eq!(config.latency_seconds(), 0.0);
    }

    #[test]
    fn rejects_zero_sample_rate() {
        let err = StreamConfig::from_json(r#"{"sample_rate": 0}"#).unwrap_err();
        assert_eq!(
            err,
            StreamError::ConfigurationFailed("sample rate must be greater than zero".into())
        );
    }

    #[test]
    fn rejects_zero_channels() {
        let config = StreamConfig {
            num_channels: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_negative_latency() {
        let config = StreamConfig {
            latency: Some(-5.0),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err("latency must be non-negative".into()));
    }

    #[test]
    fn rejects_wrong_attribute_type() {
        let err = StreamConfig::from_json(r#"{"sample_rate": "fast"}"#).unwrap_err();
        assert!(matches!(err, StreamError::ConfigurationFailed(_)));
    }
}
