// Integration tests for the sample converter
//
// Float samples quantized to PCM16 and decoded again must land within one
// quantization step of the input.

use anyhow::Result;
use voice_agent::audio::convert::{float_to_pcm16, pcm16_to_bytes, pcm16_to_float, PCM_SCALE};
use voice_agent::error::DecodeError;

const STEP: f32 = 1.0 / PCM_SCALE;

/// Deterministic sweep over [-1, 1] including the edges and tiny values
fn sweep() -> Vec<f32> {
    let mut samples: Vec<f32> = (0..=4000).map(|i| -1.0 + i as f32 * 0.0005).collect();
    samples.extend([0.0, -0.0, 1.0, -1.0, STEP / 2.0, -STEP / 2.0, 1e-7, 0.999_99]);
    // A sine wave, like a real capture window
    samples.extend((0..2048).map(|i| (i as f32 * 0.05).sin() * 0.8));
    samples
}

fn round_trip(input: &[f32]) -> Result<Vec<f32>> {
    let mut pcm = Vec::new();
    let mut bytes = Vec::new();
    let mut decoded = Vec::new();

    float_to_pcm16(input, &mut pcm);
    pcm16_to_bytes(&pcm, &mut bytes);
    pcm16_to_float(&bytes, &mut decoded)?;
    Ok(decoded)
}

#[test]
fn test_round_trip_within_one_step() -> Result<()> {
    let input = sweep();
    let decoded = round_trip(&input)?;

    assert_eq!(decoded.len(), input.len());
    for (original, restored) in input.iter().zip(&decoded) {
        assert!(
            (original - restored).abs() <= STEP,
            "{} came back as {}",
            original,
            restored
        );
    }
    Ok(())
}

#[test]
fn test_out_of_range_input_is_clamped() -> Result<()> {
    let decoded = round_trip(&[1.5, -3.0, f32::INFINITY, f32::NEG_INFINITY])?;
    assert_eq!(decoded, vec![1.0, -1.0, 1.0, -1.0]);
    Ok(())
}

#[test]
fn test_full_capture_window_size() -> Result<()> {
    let window = vec![0.25f32; 2048];
    let mut pcm = Vec::new();
    let mut bytes = Vec::new();

    float_to_pcm16(&window, &mut pcm);
    pcm16_to_bytes(&pcm, &mut bytes);

    assert_eq!(pcm.len(), 2048);
    assert_eq!(bytes.len(), 4096);
    Ok(())
}

#[test]
fn test_decode_rejects_truncated_payload() {
    let mut out = vec![0.5f32; 4];
    let err = pcm16_to_float(&[0x00, 0x10, 0x20], &mut out).unwrap_err();
    assert_eq!(err, DecodeError::OddLength(3));
}
