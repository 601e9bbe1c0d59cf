use tokio::sync::mpsc;

use super::messages::{AgentSettings, Role};
use crate::audio::AudioChunk;
use crate::auth::AccessToken;
use crate::error::TransportError;

/// Events delivered by an agent connection, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Connection accepted; settings should be sent now
    Welcome,
    SettingsApplied,
    /// Synthesized speech (16-bit mono PCM)
    Audio(AudioChunk),
    /// The agent finished sending audio for its current turn
    AgentAudioDone,
    ConversationText { role: Role, content: String },
    /// Barge-in: the user is talking
    UserStartedSpeaking,
    AgentStartedSpeaking,
    Error {
        description: String,
        code: Option<String>,
    },
    Close,
    /// Event kind this client does not act on
    Other(String),
}

/// An open, bidirectional agent connection
///
/// Owned exclusively by the session coordinator.
#[async_trait::async_trait]
pub trait AgentTransport: Send {
    /// Send the settings payload
    async fn configure(&mut self, settings: &AgentSettings) -> Result<(), TransportError>;

    /// Stream one captured PCM frame
    async fn send_audio(&mut self, chunk: AudioChunk) -> Result<(), TransportError>;

    /// Liveness signal preventing the idle timeout
    async fn keep_alive(&mut self) -> Result<(), TransportError>;

    /// Close the connection and stop event delivery
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Transport name for logging
    fn name(&self) -> &str;
}

/// A freshly opened connection and the receiving end of its events
pub struct AgentConnection {
    pub transport: Box<dyn AgentTransport>,
    pub events: mpsc::Receiver<AgentEvent>,
}

/// Opens agent connections
#[async_trait::async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(&self, token: &AccessToken) -> Result<AgentConnection, TransportError>;
}
