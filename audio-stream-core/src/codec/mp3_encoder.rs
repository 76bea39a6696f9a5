use crate::codec::lame_encoder::LameFrameEncoder;
use crate::models::error::{CodecError, StreamError};
use crate::processing::pcm;
use crate::traits::frame_codec::FrameEncoder;

/// Samples per channel in one MPEG-1 Layer III frame.
pub const MP3_FRAME_SIZE: usize = 1152;

/// Streaming MP3 encoder that only hands whole frames to the codec.
///
/// Incoming PCM accumulates in a backlog. Every time the backlog holds a
/// full frame, that frame is encoded and the backlog's stream position moves
/// forward, so callers can tell which samples the emitted bytes cover.
pub struct Mp3Encoder<E: FrameEncoder = LameFrameEncoder> {
    encoder: Option<E>,
    sample_rate: u32,
    num_channels: u16,
    backlog: Vec<i16>,
    backlog_start_position: u64,
    total_encoded: u64,
    left: Vec<i16>,
    right: Vec<i16>,
}

impl Mp3Encoder<LameFrameEncoder> {
    /// LAME encoder at 192 kbps CBR, quality 2.
    pub fn new(sample_rate: u32, num_channels: u16) -> Result<Self, StreamError> {
        let encoder = LameFrameEncoder::new(sample_rate, num_channels).map_err(|e| {
            log::error!("Failed to initialize MP3 encoder: {}", e);
            StreamError::EncodingFailed(e.to_string())
        })?;
        log::info!(
            "MP3 encoder initialized: {}Hz, {} channels, 192kbps CBR",
            sample_rate,
            num_channels
        );
        Self::with_encoder(encoder, sample_rate, num_channels)
    }
}

impl<E: FrameEncoder> Mp3Encoder<E> {
    /// Wrap an already configured frame encoder. Fails for zero channels.
    pub fn with_encoder(
        encoder: E,
        sample_rate: u32,
        num_channels: u16,
    ) -> Result<Self, StreamError> {
        if num_channels == 0 {
            return Err(StreamError::ConfigurationFailed(
                "MP3 encoder needs at least one channel".into(),
            ));
        }
        Ok(Self {
            encoder: Some(encoder),
            sample_rate,
            num_channels,
            backlog: Vec::with_capacity(MP3_FRAME_SIZE * usize::from(num_channels) * 2),
            backlog_start_position: 0,
            total_encoded: 0,
            left: Vec::with_capacity(MP3_FRAME_SIZE),
            right: Vec::with_capacity(MP3_FRAME_SIZE),
        })
    }

    /// Buffer `samples` (interleaved, starting at stream index
    /// `stream_position`) and encode every complete frame into `out`.
    pub fn encode(
        &mut self,
        samples: &[i16],
        stream_position: u64,
        out: &mut Vec<u8>,
    ) -> Result<(), StreamError> {
        let encoder = self.encoder.as_mut().ok_or_else(not_initialized)?;

        if self.backlog.is_empty() {
            self.backlog_start_position = stream_position;
        }
        self.backlog.extend_from_slice(samples);

        let frame_samples = MP3_FRAME_SIZE * usize::from(self.num_channels);
        let mut consumed = 0;
        while self.backlog.len() - consumed >= frame_samples {
            let frame = &self.backlog[consumed..consumed + frame_samples];
            encode_block(
                encoder,
                self.num_channels,
                frame,
                &mut self.left,
                &mut self.right,
                out,
            )
            .map_err(|e| encode_error("encoding", e))?;

            consumed += frame_samples;
            self.backlog_start_position += frame_samples as u64;
            self.total_encoded += frame_samples as u64;
        }
        self.backlog.drain(..consumed);
        Ok(())
    }

    /// Encode whatever remains in the backlog as a short final frame, then
    /// drain the codec's lookahead into `out`.
    pub fn flush(&mut self, out: &mut Vec<u8>) -> Result<(), StreamError> {
        let encoder = self.encoder.as_mut().ok_or_else(not_initialized)?;

        if !self.backlog.is_empty() {
            log::debug!(
                "Encoding {} remaining buffered samples before flush",
                self.backlog.len() / usize::from(self.num_channels.max(1))
            );
            encode_block(
                encoder,
                self.num_channels,
                &self.backlog,
                &mut self.left,
                &mut self.right,
                out,
            )
            .map_err(|e| encode_error("encoding", e))?;
            self.backlog_start_position += self.backlog.len() as u64;
            self.total_encoded += self.backlog.len() as u64;
            self.backlog.clear();
        }

        let flushed = encoder
            .flush(out)
            .map_err(|e| encode_error("final flush", e))?;
        if flushed > 0 {
            log::debug!("MP3 encoder flushed {} bytes from internal buffers", flushed);
        }
        Ok(())
    }

    /// Release the codec and zero all bookkeeping.
    pub fn cleanup(&mut self) {
        self.encoder = None;
        self.backlog.clear();
        self.sample_rate = 0;
        self.num_channels = 0;
        self.backlog_start_position = 0;
        self.total_encoded = 0;
    }

    pub fn is_initialized(&self) -> bool {
        self.encoder.is_some()
    }

    /// Stream index of the first sample still waiting in the backlog.
    pub fn backlog_start_position(&self) -> u64 {
        self.backlog_start_position
    }

    /// Interleaved samples waiting for a full frame.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Interleaved samples handed to the codec so far.
    pub fn total_encoded(&self) -> u64 {
        self.total_encoded
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }
}

fn encode_block<E: FrameEncoder>(
    encoder: &mut E,
    num_channels: u16,
    block: &[i16],
    left: &mut Vec<i16>,
    right: &mut Vec<i16>,
    out: &mut Vec<u8>,
) -> Result<usize, CodecError> {
    if num_channels == 2 {
        pcm::deinterleave_stereo(block, left, right);
        encoder.encode_frame(left, Some(right), out)
    } else {
        encoder.encode_frame(block, None, out)
    }
}

fn encode_error(stage: &str, err: CodecError) -> StreamError {
    log::error!("LAME {} error: {}", stage, err);
    StreamError::EncodingFailed(format!("LAME {} error: {}", stage, err))
}

fn not_initialized() -> StreamError {
    StreamError::EncodingFailed("encoder not initialized".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::mp3_decoder::Mp3Decoder;

    /// Records frame sizes and emits one byte per encoded frame.
    #[derive(Default)]
    struct RecordingEncoder {
        frames: Vec<(usize, bool)>,
        flushes: usize,
        fail: bool,
    }

    impl FrameEncoder for RecordingEncoder {
        fn encode_frame(
            &mut self,
            left: &[i16],
            right: Option<&[i16]>,
            out: &mut Vec<u8>,
        ) -> Result<usize, CodecError> {
            if self.fail {
                return Err(CodecError::Failed("invalid bit rate".into()));
            }
            self.frames.push((left.len(), right.is_some()));
            out.push(0xAA);
            Ok(1)
        }

        fn flush(&mut self, out: &mut Vec<u8>) -> Result<usize, CodecError> {
            self.flushes += 1;
            out.extend_from_slice(&[0xBB, 0xBB]);
            Ok(2)
        }
    }

    fn tone(frames: usize, rate: u32, channels: u16) -> Vec<i16> {
        (0..frames)
            .flat_map(|i| {
                let t = i as f64 / f64::from(rate);
                let v = ((2.0 * std::f64::consts::PI * 440.0 * t).sin() * 8000.0) as i16;
                std::iter::repeat(v).take(usize::from(channels))
            })
            .collect()
    }

    #[test]
    fn partial_frame_stays_in_backlog() {
        let mut enc = Mp3Encoder::with_encoder(RecordingEncoder::default(), 48000, 2).unwrap();
        let mut out = Vec::new();

        enc.encode(&vec![1; 1000], 0, &mut out).unwrap();

        assert!(out.is_empty());
        assert_eq!(enc.backlog_len(), 1000);
        assert_eq!(enc.total_encoded(), 0);
    }

    #[test]
    fn full_frames_are_encoded_and_positions_advance() {
        let mut enc = Mp3Encoder::with_encoder(RecordingEncoder::default(), 48000, 2).unwrap();
        let mut out = Vec::new();

        enc.encode(&vec![0; 1000], 500, &mut out).unwrap();
        enc.encode(&vec![0; 2000], 1500, &mut out).unwrap();

        // 3000 samples = one 2304-sample stereo frame + 696 left over
        assert_eq!(out, vec![0xAA]);
        assert_eq!(enc.backlog_len(), 696);
        assert_eq!(enc.backlog_start_position(), 500 + 2304);
        assert_eq!(enc.total_encoded(), 2304);
        assert_eq!(enc.encoder.as_ref().unwrap().frames, vec![(1152, true)]);
    }

    #[test]
    fn backlog_start_only_set_when_empty() {
        let mut enc = Mp3Encoder::with_encoder(RecordingEncoder::default(), 16000, 1).unwrap();
        let mut out = Vec::new();

        enc.encode(&[0; 100], 10_000, &mut out).unwrap();
        enc.encode(&[0; 100], 99_999, &mut out).unwrap();
        assert_eq!(enc.backlog_start_position(), 10_000);
    }

    #[test]
    fn mono_frames_pass_through() {
        let mut enc = Mp3Encoder::with_encoder(RecordingEncoder::default(), 16000, 1).unwrap();
        let mut out = Vec::new();

        enc.encode(&vec![0; 1152 * 3], 0, &mut out).unwrap();
        assert_eq!(out.len(), 3);
        assert!(enc
            .encoder
            .as_ref()
            .unwrap()
            .frames
            .iter()
            .all(|&(len, stereo)| len == 1152 && !stereo));
    }

    #[test]
    fn flush_empties_backlog_and_drains_codec() {
        let mut enc = Mp3Encoder::with_encoder(RecordingEncoder::default(), 48000, 2).unwrap();
        let mut out = Vec::new();
        enc.encode(&vec![0; 1000], 0, &mut out).unwrap();

        enc.flush(&mut out).unwrap();

        assert_eq!(enc.backlog_len(), 0);
        assert_eq!(out, vec![0xAA, 0xBB, 0xBB]);
        let inner = enc.encoder.as_ref().unwrap();
        assert_eq!(inner.frames, vec![(500, true)]);
        assert_eq!(inner.flushes, 1);
    }

    #[test]
    fn codec_failure_surfaces_error_text() {
        let failing = RecordingEncoder {
            fail: true,
            ..Default::default()
        };
        let mut enc = Mp3Encoder::with_encoder(failing, 48000, 1).unwrap();
        let err = enc.encode(&vec![0; 1152], 0, &mut Vec::new()).unwrap_err();
        assert_eq!(
            err,
            StreamError::EncodingFailed("LAME encoding error: invalid bit rate".into())
        );
    }

    #[test]
    fn zero_channels_is_rejected() {
        let err = Mp3Encoder::with_encoder(RecordingEncoder::default(), 48000, 0).err();
        assert!(matches!(err, Some(StreamError::ConfigurationFailed(_))));
    }

    #[test]
    fn cleanup_resets_state_and_rejects_use() {
        let mut enc = Mp3Encoder::with_encoder(RecordingEncoder::default(), 48000, 2).unwrap();
        enc.encode(&vec![0; 3000], 42, &mut Vec::new()).unwrap();

        enc.cleanup();

        assert!(!enc.is_initialized());
        assert_eq!(enc.backlog_len(), 0);
        assert_eq!(enc.backlog_start_position(), 0);
        assert_eq!(enc.total_encoded(), 0);
        assert_eq!(enc.num_channels(), 0);
        let err = enc.flush(&mut Vec::new()).unwrap_err();
        assert_eq!(err, StreamError::EncodingFailed("encoder not initialized".into()));
    }

    #[test]
    fn lame_stereo_produces_output_after_enough_frames() {
        let mut enc = Mp3Encoder::new(48000, 2).unwrap();
        let mut out = Vec::new();

        enc.encode(&tone(500, 48000, 2), 0, &mut out).unwrap();
        assert!(out.is_empty());
        assert_eq!(enc.backlog_len(), 1000);

        let mut position = 1000;
        for _ in 0..10 {
            let block = tone(1152, 48000, 2);
            enc.encode(&block, position, &mut out).unwrap();
            position += block.len() as u64;
        }
        assert!(!out.is_empty());

        enc.flush(&mut out).unwrap();
        assert_eq!(enc.backlog_len(), 0);
    }

    #[test]
    fn lame_rejects_unsupported_channel_count() {
        assert!(matches!(
            Mp3Encoder::new(48000, 6),
            Err(StreamError::EncodingFailed(_))
        ));
    }

    #[test]
    fn round_trip_mono_tone() {
        let input = tone(3456, 48000, 1);
        let mut enc = Mp3Encoder::new(48000, 1).unwrap();
        let mut mp3 = Vec::new();
        enc.encode(&input, 0, &mut mp3).unwrap();
        enc.flush(&mut mp3).unwrap();
        assert!(!mp3.is_empty());

        let mut decoder = Mp3Decoder::new();
        let mut pcm_bytes = Vec::new();
        decoder.decode(&mp3, &mut pcm_bytes).unwrap();

        let decoded = pcm_bytes.len() / 2;
        assert!(decoded as f64 >= 3456.0 * 0.8, "decoded {} samples", decoded);
        assert!(decoded as f64 <= 3456.0 * 1.5, "decoded {} samples", decoded);
        assert_eq!(decoder.sample_rate(), 48000);
        assert_eq!(decoder.num_channels(), 1);
    }
}
