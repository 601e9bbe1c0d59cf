/// Sample rate of every chunk exchanged with the agent
pub const SAMPLE_RATE: u32 = 24_000;

/// Bytes per 16-bit mono sample
pub const BYTES_PER_SAMPLE: usize = 2;

/// One unit of 16-bit signed little-endian mono PCM at 24kHz
///
/// Produced by the capture path (outbound) or by the agent (inbound).
/// The payload is immutable once built; chunks are moved between owners, never shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    bytes: Vec<u8>,
}

impl AudioChunk {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Build a chunk from already-quantized samples
    pub fn from_samples(samples: &[i16]) -> Self {
        let mut bytes = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
        crate::audio::convert::pcm16_to_bytes(samples, &mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of whole samples in the payload
    pub fn sample_count(&self) -> usize {
        self.bytes.len() / BYTES_PER_SAMPLE
    }

    /// Playback duration in seconds at `sample_rate`
    pub fn duration_secs(&self, sample_rate: u32) -> f64 {
        self.sample_count() as f64 / sample_rate as f64
    }
}
