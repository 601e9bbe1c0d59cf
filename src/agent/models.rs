use serde::{Deserialize, Serialize};

/// Speech recognition model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ListenModel {
    /// General purpose
    #[default]
    General,
    Medical,
}

impl ListenModel {
    pub fn model_id(&self) -> &'static str {
        match self {
            Self::General => "nova-3",
            Self::Medical => "nova-3-medical",
        }
    }
}

/// Language model behind the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ThinkModel {
    #[default]
    Claude,
    Gpt,
}

impl ThinkModel {
    pub fn provider(&self) -> &'static str {
        match self {
            Self::Claude => "anthropic",
            Self::Gpt => "open_ai",
        }
    }

    pub fn model_id(&self) -> &'static str {
        match self {
            Self::Claude => "claude-3-5-haiku-latest",
            Self::Gpt => "gpt-4o-mini",
        }
    }
}

/// Synthesized voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SpeechModel {
    #[default]
    Thalia,
    Andromeda,
    Helena,
    Apollo,
    Arcas,
    Aries,
}

impl SpeechModel {
    pub fn model_id(&self) -> &'static str {
        match self {
            Self::Thalia => "aura-2-thalia-en",
            Self::Andromeda => "aura-2-andromeda-en",
            Self::Helena => "aura-2-helena-en",
            Self::Apollo => "aura-2-apollo-en",
            Self::Arcas => "aura-2-arcas-en",
            Self::Aries => "aura-2-aries-en",
        }
    }
}

pub const DEFAULT_GREETING: &str =
    "Welcome to the Voice Agent Demo. How can I assist you today?";

/// Listen/think/speak choices sent to the agent on connect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSelection {
    pub listen: ListenModel,
    pub think: ThinkModel,
    pub speak: SpeechModel,
    /// Optional system prompt for the think model
    pub prompt: Option<String>,
    /// First thing the agent says after settings are applied
    pub greeting: Option<String>,
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self {
            listen: ListenModel::default(),
            think: ThinkModel::default(),
            speak: SpeechModel::default(),
            prompt: None,
            greeting: Some(DEFAULT_GREETING.to_string()),
        }
    }
}
