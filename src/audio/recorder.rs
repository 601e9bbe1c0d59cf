use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::chunk::AudioChunk;

/// Summary of a finished recording
#[derive(Debug, Clone)]
pub struct RecordingSummary {
    /// File path to the WAV file
    pub file_path: PathBuf,
    /// Number of samples written
    pub sample_count: usize,
    /// Duration in seconds
    pub duration_secs: f64,
}

/// Writes agent speech for one session to a mono 16-bit WAV file
pub struct AgentAudioRecorder {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    file_path: PathBuf,
    sample_rate: u32,
    sample_count: usize,
}

impl AgentAudioRecorder {
    /// Create `<dir>/<session_id>-agent.wav`, creating `dir` if needed
    ///
    /// `sample_rate` must match the rate the agent was asked to speak at.
    pub fn create(dir: impl AsRef<Path>, session_id: &str, sample_rate: u32) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).context("Failed to create recording directory")?;

        let file_path = dir.join(format!("{}-agent.wav", session_id));
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&file_path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", file_path))?;

        info!("Recording agent audio to {}", file_path.display());

        Ok(Self {
            writer: Some(writer),
            file_path,
            sample_rate,
            sample_count: 0,
        })
    }

    /// Append a chunk; a trailing odd byte is ignored
    pub fn write_chunk(&mut self, chunk: &AudioChunk) -> Result<()> {
        if let Some(writer) = &mut self.writer {
            for pair in chunk.as_bytes().chunks_exact(2) {
                writer
                    .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                    .context("Failed to write sample to WAV")?;
            }
            self.sample_count += chunk.sample_count();
        }

        Ok(())
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn finish(mut self) -> Result<RecordingSummary> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
        }

        Ok(RecordingSummary {
            file_path: self.file_path.clone(),
            sample_count: self.sample_count,
            duration_secs: self.sample_count as f64 / self.sample_rate as f64,
        })
    }
}

impl Drop for AgentAudioRecorder {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}
