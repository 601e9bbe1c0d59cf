use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::SessionState;

/// Statistics about the current session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    pub state: SessionState,

    /// When the current connection opened, if any
    pub connected_at: Option<DateTime<Utc>>,

    /// Seconds since `connected_at`
    pub duration_secs: f64,

    /// Microphone frames streamed to the agent
    pub frames_sent: u64,

    /// Microphone frames dropped because the inbox was full
    pub frames_dropped: u64,

    /// Agent audio chunks received
    pub chunks_received: u64,

    /// Agent audio chunks placed on the output clock
    pub chunks_scheduled: u64,

    /// Barge-in interruptions
    pub interruptions: u64,

    pub transcript_entries: usize,
}

impl SessionStats {
    /// One-line summary for the console
    pub fn summary(&self) -> String {
        format!(
            "{} [{}] {:.1}s, {} frames sent ({} dropped), {} chunks received, {} scheduled, {} interruptions, {} transcript lines",
            self.session_id,
            self.state,
            self.duration_secs,
            self.frames_sent,
            self.frames_dropped,
            self.chunks_received,
            self.chunks_scheduled,
            self.interruptions,
            self.transcript_entries
        )
    }
}
