//! # audio-stream-cpal
//!
//! cpal hardware backend for audio-stream-kit.
//!
//! Provides:
//! - `CpalDriver`: `AudioDriver` over a cpal host (ALSA, CoreAudio, WASAPI, ...)
//! - `CpalStream`: a stream owned by its own control thread
//!
//! Devices delivering `i16` are passed straight through; `f32` devices are
//! converted through a preallocated buffer on the audio thread.
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use audio_stream_core::{Microphone, StreamConfig};
//! use audio_stream_cpal::CpalDriver;
//!
//! let driver = Arc::new(CpalDriver::new().unwrap());
//! let mic = Microphone::new(driver, &StreamConfig::default()).unwrap();
//! mic.get_audio("pcm16", |chunk| chunk.sequence_number < 10, 0.0, 0).unwrap();
//! ```

pub mod device;
pub mod driver;
pub mod error;
pub mod stream;

pub use driver::CpalDriver;
pub use error::CpalError;
pub use stream::CpalStream;
