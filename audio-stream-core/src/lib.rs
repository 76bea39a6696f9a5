//! # audio-stream-core
//!
//! Platform-agnostic audio streaming core library.
//!
//! Provides lock-free sample buffering, wall-clock timestamping, MP3
//! encode/decode, and the microphone and speaker session logic. Platform
//! backends (cpal) implement the `AudioDriver` trait and plug into the
//! generic `StreamLifecycle`.
//!
//! ## Architecture
//!
//! ```text
//! audio-stream-core (this crate)
//! ├── traits/       ← AudioDriver, NativeStream, FrameEncoder/Decoder, Resampler, StreamDelegate
//! ├── models/       ← StreamError, StreamConfig, StreamParameters, AudioChunk, StreamState
//! ├── processing/   ← RingBuffer, StreamContext, real-time callbacks, PCM helpers, resampling
//! ├── codec/        ← Mp3Encoder (LAME), Mp3Decoder (symphonia)
//! ├── device/       ← discovery, config resolution
//! ├── session/      ← StreamLifecycle, Microphone, Speaker
//! └── mock/         ← MockDriver (tests and the `mock` feature)
//! ```

pub mod codec;
pub mod device;
pub mod models;
pub mod processing;
pub mod session;
pub mod traits;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export key types at crate root for convenience.
pub use codec::{Mp3Decoder, Mp3Encoder};
pub use device::{discover, resolve_stream_parameters};
pub use models::audio_models::{AudioCodec, AudioInfo, AudioProperties, DeviceDescriptor, DeviceInfo, DeviceKind};
pub use models::chunk::AudioChunk;
pub use models::config::StreamConfig;
pub use models::error::{CodecError, DriverError, StreamError};
pub use models::params::{StreamDirection, StreamParameters};
pub use models::state::StreamState;
pub use processing::ring_buffer::RingBuffer;
pub use processing::stream_context::{CaptureContext, RenderContext, StreamContext};
pub use session::lifecycle::StreamLifecycle;
pub use session::microphone::Microphone;
pub use session::speaker::Speaker;
pub use traits::audio_driver::{AudioDriver, CallbackFlow, CallbackTiming, NativeStream, StreamCallback};
pub use traits::resampler::Resampler;
pub use traits::stream_delegate::StreamDelegate;
