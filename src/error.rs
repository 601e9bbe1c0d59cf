use thiserror::Error;

use crate::session::SessionState;

/// Audio device could not be acquired or driven.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("No {0} device available")]
    NoDevice(&'static str),

    #[error("Audio device '{0}' not found")]
    DeviceNotFound(String),

    #[error("Failed to enumerate audio devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("Failed to query device configuration: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("Failed to query supported configurations: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("Failed to open audio stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),
}

/// Agent socket failure or an error reported by the agent itself.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid agent request: {0}")]
    Request(String),

    #[error("Failed to encode agent message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Agent error: {description}")]
    Agent {
        description: String,
        code: Option<String>,
    },

    #[error("Agent connection closed")]
    Closed,
}

/// Token acquisition failed.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Non-200 response; `body` is the raw response text.
    #[error("Authentication failed: {body}")]
    Rejected { status: u16, body: String },

    #[error("Authentication failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Authentication failed: invalid token response: {0}")]
    InvalidResponse(String),

    #[error("Authentication failed: environment variable {0} is not set")]
    MissingApiKey(String),
}

/// Inbound audio could not be interpreted as 16-bit PCM.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("PCM payload has odd length ({0} bytes)")]
    OddLength(usize),

    #[error("PCM payload is empty")]
    Empty,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("Skipped audio chunk: {0}")]
    Decode(#[from] DecodeError),

    #[error("Playback device error: {0}")]
    Device(String),

    #[error("Playback is not active")]
    Inactive,
}

/// Errors reported by the session coordinator.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("No token available. Please authenticate first.")]
    NotAuthenticated,

    #[error("Already authenticated")]
    AlreadyAuthenticated,

    #[error("Already connected (session is {0})")]
    AlreadyConnected(SessionState),

    #[error("No client connected to disconnect.")]
    NotConnected,
}
