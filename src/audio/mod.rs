pub mod capture;
pub mod chunk;
pub mod convert;
pub mod output;
pub mod playback;
pub mod recorder;

pub use capture::{CaptureConfig, CaptureSource, FrameAssembler, FrameSink, MicrophoneCapture};
pub use chunk::{AudioChunk, SAMPLE_RATE};
pub use output::CpalPlaybackSink;
pub use playback::{DrainReport, PlaybackScheduler, PlaybackSink, ScheduledWindow};
pub use recorder::{AgentAudioRecorder, RecordingSummary};
