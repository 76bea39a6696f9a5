use thiserror::Error;

/// Errors surfaced by stream construction, sessions and codecs.
///
/// Real-time callback faults never appear here; they only stop the stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("device not available: {0}")]
    DeviceNotAvailable(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    #[error("decoding failed: {0}")]
    DecodingFailed(String),

    #[error("resampling failed: {0}")]
    Resampling(String),
}

/// Errors reported by an [`AudioDriver`](crate::traits::audio_driver::AudioDriver)
/// or one of its native streams.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("driver not initialized")]
    NotInitialized,

    #[error("invalid device index {0}")]
    InvalidDevice(usize),

    #[error("format not supported: {0}")]
    FormatNotSupported(String),

    #[error("stream closed")]
    StreamClosed,

    #[error("host error: {0}")]
    Host(String),
}

impl From<DriverError> for StreamError {
    fn from(err: DriverError) -> Self {
        StreamError::Device(err.to_string())
    }
}

/// Errors reported by a frame-level codec driver.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("codec initialization failed: {0}")]
    Init(String),

    #[error("{0}")]
    Failed(String),
}
