//! 16-bit PCM byte and channel-layout helpers.

/// Serialize samples as little-endian bytes (2 bytes per sample).
pub fn samples_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * 2);
    append_le_bytes(samples, &mut data);
    data
}

/// Append samples to `out` as little-endian bytes.
pub fn append_le_bytes(samples: &[i16], out: &mut Vec<u8>) {
    out.reserve(samples.len() * 2);
    for &sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
}

/// Parse little-endian bytes into samples. A trailing odd byte is ignored.
pub fn le_bytes_to_samples(data: &[u8]) -> Vec<i16> {
    data.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Split interleaved stereo `[L0, R0, L1, R1, ...]` into two planes.
///
/// A trailing half frame is dropped.
pub fn deinterleave_stereo(samples: &[i16], left: &mut Vec<i16>, right: &mut Vec<i16>) {
    left.clear();
    right.clear();
    for frame in samples.chunks_exact(2) {
        left.push(frame[0]);
        right.push(frame[1]);
    }
}

/// Interleave planes into `out`: `L, R, L, R, …` when `right` is given,
/// otherwise `left` as-is.
pub fn append_interleaved(left: &[i16], right: Option<&[i16]>, out: &mut Vec<u8>) {
    match right {
        Some(right) => {
            let frames = left.len().min(right.len());
            out.reserve(frames * 4);
            for i in 0..frames {
                out.extend_from_slice(&left[i].to_le_bytes());
                out.extend_from_slice(&right[i].to_le_bytes());
            }
        }
        None => append_le_bytes(left, out),
    }
}

/// Convert a float sample in `[-1.0, 1.0]` to 16-bit PCM, clamping.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Convert a 16-bit PCM sample to float.
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / i16::MAX as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn le_bytes_layout() {
        let bytes = samples_to_le_bytes(&[1, -1, 0x1234]);
        assert_eq!(bytes, vec![0x01, 0x00, 0xFF, 0xFF, 0x34, 0x12]);
    }

    #[test]
    fn bytes_to_samples_ignores_trailing_byte() {
        assert_eq!(le_bytes_to_samples(&[0x01, 0x00, 0x02]), vec![1]);
    }

    #[test]
    fn deinterleave_basic() {
        let (mut left, mut right) = (Vec::new(), Vec::new());
        deinterleave_stereo(&[1, 4, 2, 5, 3, 6, 9], &mut left, &mut right);
        assert_eq!(left, vec![1, 2, 3]);
        assert_eq!(right, vec![4, 5, 6]);
    }

    #[test]
    fn interleave_stereo_and_mono() {
        let mut stereo = Vec::new();
        append_interleaved(&[1, 2], Some(&[3, 4]), &mut stereo);
        assert_eq!(le_bytes_to_samples(&stereo), vec![1, 3, 2, 4]);

        let mut mono = Vec::new();
        append_interleaved(&[7, 8], None, &mut mono);
        assert_eq!(le_bytes_to_samples(&mono), vec![7, 8]);
    }

    #[test]
    fn float_conversion_clamps() {
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(-3.0), -i16::MAX);
        assert_eq!(f32_to_i16(0.0), 0);
        assert!((i16_to_f32(i16::MAX) - 1.0).abs() < 1e-6);
    }
}
