//! Conversion between normalized float audio and 16-bit PCM
//!
//! All functions write into caller-owned buffers so the capture and playback
//! paths can reuse one scratch allocation per stream instead of allocating on
//! every audio-rate frame.

use crate::error::DecodeError;

/// Full-scale magnitude used in both directions
pub const PCM_SCALE: f32 = 32767.0;

/// Quantize a single float sample
#[inline]
pub fn sample_to_pcm16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    // f32::round rounds half away from zero
    (sample.clamp(-1.0, 1.0) * PCM_SCALE).round() as i16
}

#[inline]
pub fn pcm16_to_sample(sample: i16) -> f32 {
    sample as f32 / PCM_SCALE
}

/// Convert float samples in `[-1, 1]` to PCM16, replacing the contents of `out`
pub fn float_to_pcm16(samples: &[f32], out: &mut Vec<i16>) {
    out.clear();
    out.extend(samples.iter().map(|&s| sample_to_pcm16(s)));
}

/// Decode little-endian PCM16 bytes to floats, replacing the contents of `out`
///
/// An odd byte count cannot be split into samples and is rejected.
pub fn pcm16_to_float(bytes: &[u8], out: &mut Vec<f32>) -> Result<(), DecodeError> {
    out.clear();
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddLength(bytes.len()));
    }
    out.extend(
        bytes
            .chunks_exact(2)
            .map(|pair| pcm16_to_sample(i16::from_le_bytes([pair[0], pair[1]]))),
    );
    Ok(())
}

/// Serialize PCM16 samples as little-endian bytes, replacing the contents of `out`
pub fn pcm16_to_bytes(samples: &[i16], out: &mut Vec<u8>) {
    out.clear();
    out.reserve(samples.len() * 2);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
}
