use crate::models::error::CodecError;

/// A frame-at-a-time compressed-audio encoder.
///
/// Implemented by `LameFrameEncoder`.
pub trait FrameEncoder {
    /// Encode one frame of planar samples, appending bytes to `out`.
    ///
    /// `right` is None for mono. Returns the number of bytes appended, which
    /// may be 0 while the codec fills its lookahead.
    fn encode_frame(
        &mut self,
        left: &[i16],
        right: Option<&[i16]>,
        out: &mut Vec<u8>,
    ) -> Result<usize, CodecError>;

    /// Drain the codec's lookahead, appending the final bytes to `out`.
    fn flush(&mut self, out: &mut Vec<u8>) -> Result<usize, CodecError>;
}

/// Result of one decoder call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Samples per channel written to the output planes; 0 means nothing
    /// (more) is available.
    pub samples: usize,
    /// 0 until the stream header has been parsed.
    pub sample_rate: u32,
    /// 0 until the stream header has been parsed.
    pub channels: u16,
}

/// A compressed-audio decoder fed a whole buffer and then drained.
///
/// Implemented by `SymphoniaFrameDecoder`.
pub trait FrameDecoder {
    /// Submit `input`, or pass None to pull the next decoded frame.
    ///
    /// Decoded samples replace the contents of `left` and `right` (`right`
    /// stays empty for mono).
    fn decode_headers(
        &mut self,
        input: Option<&[u8]>,
        left: &mut Vec<i16>,
        right: &mut Vec<i16>,
    ) -> Result<DecodedFrame, CodecError>;
}
