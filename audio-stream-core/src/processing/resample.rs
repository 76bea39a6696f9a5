//! Sample-rate conversion over rubato.

use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};

use crate::models::error::StreamError;
use crate::processing::pcm::{f32_to_i16, i16_to_f32};
use crate::traits::resampler::Resampler;

/// Upper bound on flush calls made to fill out the resampler's delay line.
const MAX_FLUSHES: usize = 8;

/// Polynomial (septic) resampler for interleaved 16-bit PCM.
///
/// Each call converts one complete buffer: the whole input is fed as a single
/// chunk, the converter's delay is trimmed from the front, and the tail is
/// flushed out with silence so the result has exactly
/// [`output_frames`](Self::output_frames) frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolynomialResampler;

impl PolynomialResampler {
    pub fn new() -> Self {
        Self
    }

    /// Frames produced for `in_frames` input frames.
    pub fn output_frames(in_frames: usize, in_rate: u32, out_rate: u32) -> usize {
        (in_frames as f64 * f64::from(out_rate) / f64::from(in_rate)).round() as usize
    }
}

impl Resampler for PolynomialResampler {
    fn resample(
        &self,
        in_rate: u32,
        out_rate: u32,
        channels: u16,
        input: &[i16],
    ) -> Result<Vec<i16>, StreamError> {
        if in_rate == 0 || out_rate == 0 {
            return Err(StreamError::Resampling(format!(
                "invalid rates {} -> {}",
                in_rate, out_rate
            )));
        }
        if channels == 0 {
            return Err(StreamError::Resampling("channel count must be positive".into()));
        }
        let channels = usize::from(channels);
        if input.len() % channels != 0 {
            return Err(StreamError::Resampling(format!(
                "{} samples is not a whole number of {}-channel frames",
                input.len(),
                channels
            )));
        }
        if in_rate == out_rate || input.is_empty() {
            return Ok(input.to_vec());
        }

        let in_frames = input.len() / channels;
        let wanted = Self::output_frames(in_frames, in_rate, out_rate);

        let mut resampler = FastFixedIn::<f32>::new(
            f64::from(out_rate) / f64::from(in_rate),
            1.0,
            PolynomialDegree::Septic,
            in_frames,
            channels,
        )
        .map_err(|e| StreamError::Resampling(format!("failed to create resampler: {}", e)))?;
        let delay = resampler.output_delay();

        let mut planar = resampler
            .process(&deinterleave(input, channels), None)
            .map_err(|e| StreamError::Resampling(e.to_string()))?;

        let mut flushes = 0;
        while planar[0].len() < delay + wanted && flushes < MAX_FLUSHES {
            let tail = resampler
                .process_partial(None::<&[Vec<f32>]>, None)
                .map_err(|e| StreamError::Resampling(e.to_string()))?;
            if tail[0].is_empty() {
                break;
            }
            for (plane, rest) in planar.iter_mut().zip(tail) {
                plane.extend(rest);
            }
            flushes += 1;
        }

        log::debug!(
            "Resampled {} frames at {} Hz to {} frames at {} Hz (delay {})",
            in_frames,
            in_rate,
            wanted,
            out_rate,
            delay
        );
        Ok(interleave(&planar, delay, wanted))
    }
}

fn deinterleave(samples: &[i16], channels: usize) -> Vec<Vec<f32>> {
    let frames = samples.len() / channels;
    let mut planar = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (plane, &sample) in planar.iter_mut().zip(frame) {
            plane.push(i16_to_f32(sample));
        }
    }
    planar
}

/// Interleave `frames` frames starting at `offset`, padding with silence if
/// the converter came up short.
fn interleave(planar: &[Vec<f32>], offset: usize, frames: usize) -> Vec<i16> {
    let mut out = Vec::with_capacity(frames * planar.len());
    for i in offset..offset + frames {
        for plane in planar {
            out.push(plane.get(i).copied().map_or(0, f32_to_i16));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_rate_is_passthrough() {
        let samples = vec![1, 2, 3];
        let out = PolynomialResampler.resample(48000, 48000, 1, &samples).unwrap();
        assert_eq!(out, samples);
    }

    #[test]
    fn upsample_doubles_frame_count() {
        let input = vec![0i16; 480];
        let out = PolynomialResampler.resample(24000, 48000, 1, &input).unwrap();
        assert_eq!(out.len(), 960);
    }

    #[test]
    fn downsample_rounds_frame_count() {
        let input: Vec<i16> = (0..101).collect();
        let out = PolynomialResampler.resample(48000, 16000, 1, &input).unwrap();
        // 101 / 3 = 33.67 → 34
        assert_eq!(out.len(), 34);
    }

    #[test]
    fn constant_level_survives_conversion() {
        let input = vec![8000i16; 1000];
        let out = PolynomialResampler.resample(16000, 44100, 1, &input).unwrap();
        assert_eq!(out.len(), 2756);
        for &s in &out[100..out.len() - 100] {
            assert!((i32::from(s) - 8000).abs() <= 16, "sample {}", s);
        }
    }

    #[test]
    fn stereo_channels_stay_separate() {
        let input: Vec<i16> = (0..400).map(|i| if i % 2 == 0 { 4000 } else { -4000 }).collect();
        let out = PolynomialResampler.resample(44100, 22050, 2, &input).unwrap();
        assert_eq!(out.len(), 200);
        let interior = &out[20..180];
        assert!(interior.iter().step_by(2).all(|&s| s > 0));
        assert!(interior.iter().skip(1).step_by(2).all(|&s| s < 0));
    }

    #[test]
    fn rejects_partial_frames() {
        let err = PolynomialResampler.resample(8000, 16000, 2, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, StreamError::Resampling(_)));
    }

    #[test]
    fn rejects_zero_rate() {
        assert!(PolynomialResampler.resample(0, 16000, 1, &[1]).is_err());
    }
}
