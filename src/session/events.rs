use serde::Serialize;

use super::state::SessionState;
use super::transcript::TranscriptEntry;
use crate::agent::{AgentEvent, ModelSelection};
use crate::audio::AudioChunk;

/// Published by the coordinator for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SessionUpdate {
    State(SessionState),
    Transcript(TranscriptEntry),
    /// Agent speech started (`true`) or finished (`false`)
    Speaking(bool),
    /// Informational, non-fatal message
    Notice(String),
    /// User-visible error text
    Error(String),
}

/// User actions accepted by [`super::SessionCoordinator::run`]
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Authenticate,
    Connect(ModelSelection),
    Disconnect,
    Reset,
    /// Publish a statistics notice
    Status,
    Quit,
}

/// Work posted into the coordinator's inbox
///
/// `epoch` identifies the connection the message belongs to; messages from a
/// torn-down connection are discarded.
#[derive(Debug)]
pub enum SessionMessage {
    Captured { epoch: u64, chunk: AudioChunk },
    Agent { epoch: u64, event: AgentEvent },
}

impl SessionMessage {
    pub fn epoch(&self) -> u64 {
        match self {
            Self::Captured { epoch, .. } | Self::Agent { epoch, .. } => *epoch,
        }
    }
}
