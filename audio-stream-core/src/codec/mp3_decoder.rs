use crate::codec::symphonia_decoder::SymphoniaFrameDecoder;
use crate::models::error::{CodecError, StreamError};
use crate::processing::pcm;
use crate::traits::frame_codec::{DecodedFrame, FrameDecoder};

const ID3V2_HEADER_LEN: usize = 10;

/// Byte offset of the first MP3 frame, skipping a leading ID3v2 tag.
///
/// The tag size is a 28-bit synchsafe integer in bytes 6..10 (7 bits per
/// byte, most significant first) and excludes the 10-byte header.
pub fn id3v2_offset(data: &[u8]) -> usize {
    if data.len() < ID3V2_HEADER_LEN || &data[..3] != b"ID3" {
        return 0;
    }
    let tag_size = data[6..10]
        .iter()
        .fold(0usize, |size, &byte| (size << 7) | usize::from(byte & 0x7F));
    let total = tag_size + ID3V2_HEADER_LEN;
    log::debug!("Skipping ID3v2 tag: {} bytes", total);
    total
}

/// Whole-buffer MP3 to interleaved PCM16 decoder.
///
/// The stream format is latched from the first header the codec parses and
/// kept for the lifetime of the decoder.
pub struct Mp3Decoder<D: FrameDecoder = SymphoniaFrameDecoder> {
    decoder: D,
    sample_rate: u32,
    num_channels: u16,
    left: Vec<i16>,
    right: Vec<i16>,
}

impl Mp3Decoder<SymphoniaFrameDecoder> {
    pub fn new() -> Self {
        Self::with_decoder(SymphoniaFrameDecoder::new())
    }
}

impl Default for Mp3Decoder<SymphoniaFrameDecoder> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: FrameDecoder> Mp3Decoder<D> {
    pub fn with_decoder(decoder: D) -> Self {
        Self {
            decoder,
            sample_rate: 0,
            num_channels: 0,
            left: Vec::new(),
            right: Vec::new(),
        }
    }

    /// Decode `encoded` and append little-endian interleaved PCM to `out`.
    ///
    /// Empty input is a no-op. Anything else must yield at least one sample
    /// and a known format, otherwise the call fails.
    pub fn decode(&mut self, encoded: &[u8], out: &mut Vec<u8>) -> Result<(), StreamError> {
        if encoded.is_empty() {
            log::debug!("No MP3 data to decode");
            return Ok(());
        }

        let offset = id3v2_offset(encoded);
        if offset >= encoded.len() {
            log::error!("MP3 data contains only an ID3 tag, no audio frames");
            return Err(StreamError::DecodingFailed("no MP3 audio data found".into()));
        }
        log::debug!(
            "Decoding {} bytes of MP3 data (offset: {})",
            encoded.len() - offset,
            offset
        );

        let start_len = out.len();

        let first = self
            .decoder
            .decode_headers(Some(&encoded[offset..]), &mut self.left, &mut self.right)
            .map_err(|e| decode_error("MP3 decoding error", e))?;
        self.append(first, out)?;

        let mut flushed = 0;
        loop {
            let frame = self
                .decoder
                .decode_headers(None, &mut self.left, &mut self.right)
                .map_err(|e| decode_error("MP3 decoder failed to flush", e))?;
            if frame.samples == 0 {
                break;
            }
            self.append(frame, out)?;
            flushed += 1;
        }
        log::debug!("Flushed {} decoded frames", flushed);

        if out.len() == start_len {
            log::error!("No audio data was decoded from MP3");
            return Err(StreamError::DecodingFailed("no audio data was decoded".into()));
        }
        if self.sample_rate == 0 || self.num_channels == 0 {
            log::error!(
                "Failed to extract MP3 audio properties (sample_rate={}, num_channels={})",
                self.sample_rate,
                self.num_channels
            );
            return Err(StreamError::DecodingFailed(
                "failed to extract MP3 audio properties".into(),
            ));
        }

        log::debug!(
            "Total decoded: {} frames ({} bytes)",
            (out.len() - start_len) / 2 / usize::from(self.num_channels),
            out.len() - start_len
        );
        Ok(())
    }

    /// Latch the format if still unknown, then append any samples.
    fn append(&mut self, frame: DecodedFrame, out: &mut Vec<u8>) -> Result<(), StreamError> {
        if self.sample_rate == 0 && frame.sample_rate != 0 {
            self.sample_rate = frame.sample_rate;
            self.num_channels = frame.channels;
            log::debug!(
                "MP3 audio properties: {}Hz, {} channels",
                self.sample_rate,
                self.num_channels
            );
        }
        if frame.samples == 0 {
            return Ok(());
        }

        let count = frame.samples.min(self.left.len());
        match self.num_channels {
            1 => pcm::append_interleaved(&self.left[..count], None, out),
            2 => {
                let count = count.min(self.right.len());
                pcm::append_interleaved(&self.left[..count], Some(&self.right[..count]), out)
            }
            0 => {
                return Err(StreamError::DecodingFailed(
                    "MP3 properties not extracted before appending samples".into(),
                ))
            }
            other => {
                return Err(StreamError::DecodingFailed(format!(
                    "invalid channel count: {}",
                    other
                )))
            }
        }
        Ok(())
    }

    /// 0 until a header has been parsed.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// 0 until a header has been parsed.
    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }
}

fn decode_error(context: &str, err: CodecError) -> StreamError {
    log::error!("{}: {}", context, err);
    StreamError::DecodingFailed(format!("{}: {}", context, err))
}
