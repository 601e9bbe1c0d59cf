pub mod agent;
pub mod audio;
pub mod auth;
pub mod config;
pub mod error;
pub mod session;

pub use agent::{
    AgentConnection, AgentEvent, AgentSettings, AgentTransport, ModelSelection, TransportConnector,
    WebSocketConnector,
};
pub use audio::{
    AgentAudioRecorder, AudioChunk, CaptureConfig, CaptureSource, CpalPlaybackSink,
    MicrophoneCapture, PlaybackScheduler, PlaybackSink,
};
pub use auth::{AccessToken, TokenSource};
pub use config::Config;
pub use error::{AuthError, DecodeError, DeviceError, PlaybackError, SessionError, TransportError};
pub use session::{
    SessionCommand, SessionConfig, SessionCoordinator, SessionState, SessionStats, SessionUpdate,
};
