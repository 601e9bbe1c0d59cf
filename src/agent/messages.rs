use serde::{Deserialize, Serialize};
use std::fmt;

use super::models::ModelSelection;
use super::transport::AgentEvent;

/// PCM encoding used in both directions
pub const ENCODING_LINEAR16: &str = "linear16";

/// Speaker of a conversation line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Unknown => write!(f, "unknown"),
        }
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// Settings payload sent once the agent says Welcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    pub audio: AudioSettings,
    pub agent: AgentBehaviour,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSettings {
    pub input: AudioFormat,
    pub output: OutputFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub encoding: String,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputFormat {
    pub encoding: String,
    pub sample_rate: u32,
    pub container: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentBehaviour {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greeting: Option<String>,
    pub listen: ProviderSlot,
    pub think: ThinkSlot,
    pub speak: ProviderSlot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSlot {
    pub provider: Provider,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkSlot {
    pub provider: Provider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    #[serde(rename = "type")]
    pub kind: String,
    pub model: String,
}

impl AgentSettings {
    pub fn from_selection(selection: &ModelSelection, sample_rate: u32) -> Self {
        Self {
            audio: AudioSettings {
                input: AudioFormat {
                    encoding: ENCODING_LINEAR16.to_string(),
                    sample_rate,
                },
                output: OutputFormat {
                    encoding: ENCODING_LINEAR16.to_string(),
                    sample_rate,
                    container: "none".to_string(),
                },
            },
            agent: AgentBehaviour {
                greeting: selection.greeting.clone(),
                listen: ProviderSlot {
                    provider: Provider {
                        kind: "deepgram".to_string(),
                        model: selection.listen.model_id().to_string(),
                    },
                },
                think: ThinkSlot {
                    provider: Provider {
                        kind: selection.think.provider().to_string(),
                        model: selection.think.model_id().to_string(),
                    },
                    prompt: selection.prompt.clone(),
                },
                speak: ProviderSlot {
                    provider: Provider {
                        kind: "deepgram".to_string(),
                        model: selection.speak.model_id().to_string(),
                    },
                },
            },
        }
    }
}

/// Control messages written to the agent socket as JSON text frames
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage<'a> {
    Settings(&'a AgentSettings),
    KeepAlive,
}

impl ClientMessage<'_> {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// JSON events received from the agent
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ServerMessage {
    Welcome {},
    SettingsApplied {},
    ConversationText {
        role: Role,
        content: String,
    },
    UserStartedSpeaking {},
    AgentStartedSpeaking {},
    AgentAudioDone {},
    Error {
        #[serde(default, alias = "message")]
        description: String,
        #[serde(default)]
        code: Option<String>,
    },
    #[serde(other)]
    Unrecognized,
}

#[derive(Deserialize)]
struct TypeTag {
    #[serde(rename = "type", default)]
    kind: String,
}

/// Parse a JSON text frame from the agent
///
/// Event kinds this client does not act on map to [`AgentEvent::Other`].
pub fn parse_server_message(text: &str) -> serde_json::Result<AgentEvent> {
    let event = match serde_json::from_str::<ServerMessage>(text)? {
        ServerMessage::Welcome {} => AgentEvent::Welcome,
        ServerMessage::SettingsApplied {} => AgentEvent::SettingsApplied,
        ServerMessage::ConversationText { role, content } => {
            AgentEvent::ConversationText { role, content }
        }
        ServerMessage::UserStartedSpeaking {} => AgentEvent::UserStartedSpeaking,
        ServerMessage::AgentStartedSpeaking {} => AgentEvent::AgentStartedSpeaking,
        ServerMessage::AgentAudioDone {} => AgentEvent::AgentAudioDone,
        ServerMessage::Error { description, code } => AgentEvent::Error { description, code },
        ServerMessage::Unrecognized => {
            let tag: TypeTag = serde_json::from_str(text)?;
            AgentEvent::Other(tag.kind)
        }
    };

    Ok(event)
}
