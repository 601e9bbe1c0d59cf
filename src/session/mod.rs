//! Voice session coordination
//!
//! This module provides the `SessionCoordinator` that manages:
//! - Token acquisition and the session state machine
//! - The agent connection and its keep-alive heartbeat
//! - Microphone capture gated on the session being open
//! - Gapless playback of agent speech with barge-in
//! - The conversation transcript and session statistics

mod config;
mod coordinator;
mod events;
mod state;
mod stats;
mod transcript;

pub use config::SessionConfig;
pub use coordinator::{SessionCoordinator, DISCONNECT_TIMEOUT};
pub use events::{SessionCommand, SessionMessage, SessionUpdate};
pub use state::SessionState;
pub use stats::SessionStats;
pub use transcript::{Transcript, TranscriptEntry};
