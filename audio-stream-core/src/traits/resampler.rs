use crate::models::error::StreamError;

/// Sample-rate converter for interleaved 16-bit PCM.
///
/// Output frame count is `round(in_frames × out_rate / in_rate)`.
pub trait Resampler: Send + Sync {
    fn resample(
        &self,
        in_rate: u32,
        out_rate: u32,
        channels: u16,
        input: &[i16],
    ) -> Result<Vec<i16>, StreamError>;
}
