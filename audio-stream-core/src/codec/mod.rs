//! MP3 encoding and decoding over pluggable frame codecs.

pub mod lame_encoder;
pub mod mp3_decoder;
pub mod mp3_encoder;
pub mod symphonia_decoder;

pub use lame_encoder::LameFrameEncoder;
pub use mp3_decoder::Mp3Decoder;
pub use mp3_encoder::{Mp3Encoder, MP3_FRAME_SIZE};
pub use symphonia_decoder::SymphoniaFrameDecoder;
