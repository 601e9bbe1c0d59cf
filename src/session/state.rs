use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one voice session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No token yet
    #[default]
    Unauthenticated,
    /// Token held, no connection
    Authenticated,
    /// Connection open, waiting for the agent to apply settings
    Configuring,
    /// Audio flows in both directions
    Open,
    /// Connection ended; the token is kept so the user can reconnect
    Closed,
}

impl SessionState {
    /// A transport exists in this state
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Configuring | Self::Open)
    }

    /// Capture runs and playback accepts chunks only here
    pub fn accepts_audio(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticated => "authenticated",
            Self::Configuring => "configuring",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
