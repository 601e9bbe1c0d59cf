use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::SAMPLE_RATE;
use crate::config::Config;

/// Configuration for a session coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Identifier used for logs and recording file names (e.g., "session-<uuid>")
    pub session_id: String,

    /// Agent audio rate in both directions
    pub sample_rate: u32,

    /// Period of the keep-alive heartbeat while the session is open
    /// Default: 8 seconds
    pub keep_alive_interval: Duration,

    /// Bounded inbox between the audio/transport producers and the coordinator
    pub inbox_capacity: usize,

    /// Where agent speech is recorded; `None` disables recording
    pub recording_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            sample_rate: SAMPLE_RATE,
            keep_alive_interval: Duration::from_secs(8),
            inbox_capacity: 32,
            recording_dir: None,
        }
    }
}

impl SessionConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sample_rate: config.audio.sample_rate,
            keep_alive_interval: config.agent.keep_alive_interval(),
            inbox_capacity: config.audio.inbox_capacity.max(1),
            recording_dir: config.recording.directory.clone(),
            ..Self::default()
        }
    }
}
