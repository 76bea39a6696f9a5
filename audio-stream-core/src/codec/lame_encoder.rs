//! LAME-backed MP3 frame encoder.

use mp3lame_encoder::{max_required_buffer_size, Bitrate, Builder, DualPcm, FlushGap, MonoPcm, Quality};

use crate::models::error::CodecError;
use crate::traits::frame_codec::FrameEncoder;

/// Smallest buffer LAME accepts for a final flush.
const FLUSH_BUFFER_SIZE: usize = 7200;

/// 192 kbps CBR, quality 2, no Xing/Info header frame.
///
/// The header frame is skipped because a streamed encoder never seeks back
/// to fill it in, and a zeroed placeholder decodes as a frame of silence.
pub struct LameFrameEncoder {
    encoder: mp3lame_encoder::Encoder,
}

impl LameFrameEncoder {
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self, CodecError> {
        if !(1..=2).contains(&channels) {
            return Err(CodecError::Init(format!(
                "MP3 supports 1 or 2 channels, got {}",
                channels
            )));
        }

        let mut builder = Builder::new()
            .ok_or_else(|| CodecError::Init("failed to allocate LAME context".into()))?;
        builder
            .set_num_channels(channels as u8)
            .map_err(|e| CodecError::Init(format!("set channels: {}", e)))?;
        builder
            .set_sample_rate(sample_rate)
            .map_err(|e| CodecError::Init(format!("set sample rate {}: {}", sample_rate, e)))?;
        builder
            .set_brate(Bitrate::Kbps192)
            .map_err(|e| CodecError::Init(format!("set bitrate: {}", e)))?;
        builder
            .set_quality(Quality::NearBest)
            .map_err(|e| CodecError::Init(format!("set quality: {}", e)))?;
        builder
            .set_to_write_vbr_tag(false)
            .map_err(|e| CodecError::Init(format!("disable VBR tag: {}", e)))?;

        let encoder = builder
            .build()
            .map_err(|e| CodecError::Init(e.to_string()))?;
        Ok(Self { encoder })
    }
}

impl FrameEncoder for LameFrameEncoder {
    fn encode_frame(
        &mut self,
        left: &[i16],
        right: Option<&[i16]>,
        out: &mut Vec<u8>,
    ) -> Result<usize, CodecError> {
        out.reserve(max_required_buffer_size(left.len()));
        let written = match right {
            Some(right) => self.encoder.encode_to_vec(DualPcm { left, right }, out),
            None => self.encoder.encode_to_vec(MonoPcm(left), out),
        };
        written.map_err(|e| CodecError::Failed(e.to_string()))
    }

    fn flush(&mut self, out: &mut Vec<u8>) -> Result<usize, CodecError> {
        out.reserve(FLUSH_BUFFER_SIZE);
        self.encoder
            .flush_to_vec::<FlushGap>(out)
            .map_err(|e| CodecError::Failed(e.to_string()))
    }
}
