pub mod audio_driver;
pub mod frame_codec;
pub mod resampler;
pub mod stream_delegate;
