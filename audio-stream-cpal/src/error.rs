use thiserror::Error;

use audio_stream_core::models::error::DriverError;

/// Failures inside the cpal backend. Converted to [`DriverError`] at the
/// `AudioDriver` boundary.
#[derive(Debug, Error)]
pub enum CpalError {
    #[error("audio host unavailable: {0}")]
    HostUnavailable(#[from] cpal::HostUnavailable),

    #[error("failed to enumerate devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query supported configurations: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("failed to query default configuration: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start stream: {0}")]
    Play(#[from] cpal::PlayStreamError),

    #[error("failed to pause stream: {0}")]
    Pause(#[from] cpal::PauseStreamError),

    #[error("stream thread failed: {0}")]
    Thread(String),
}

impl From<CpalError> for DriverError {
    fn from(err: CpalError) -> Self {
        DriverError::Host(err.to_string())
    }
}
