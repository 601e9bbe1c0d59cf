use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::agent::models::{ListenModel, ModelSelection, SpeechModel, ThinkModel, DEFAULT_GREETING};
use crate::agent::DEFAULT_AGENT_URL;
use crate::audio::capture::DEFAULT_WINDOW_SIZE;
use crate::audio::SAMPLE_RATE;
use crate::auth::{DEFAULT_API_KEY_ENV, DEFAULT_GRANT_URL, DEFAULT_TOKEN_TTL_SECS};

pub const DEFAULT_CONFIG_PATH: &str = "config/voice-agent";
pub const ENV_PREFIX: &str = "VOICE_AGENT";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub auth: AuthConfig,
    pub agent: AgentConfig,
    pub audio: AudioConfig,
    pub recording: RecordingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "voice-agent".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Token-issuing endpoint; when unset tokens are granted by API key
    pub token_url: Option<String>,
    /// Environment variable holding the provider API key
    pub api_key_env: String,
    pub grant_url: String,
    pub ttl_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_url: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            grant_url: DEFAULT_GRANT_URL.to_string(),
            ttl_seconds: DEFAULT_TOKEN_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub url: String,
    pub greeting: String,
    pub prompt: Option<String>,
    pub listen: ListenModel,
    pub think: ThinkModel,
    pub speak: SpeechModel,
    pub keep_alive_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_AGENT_URL.to_string(),
            greeting: DEFAULT_GREETING.to_string(),
            prompt: None,
            listen: ListenModel::default(),
            think: ThinkModel::default(),
            speak: SpeechModel::default(),
            keep_alive_secs: 8,
        }
    }
}

impl AgentConfig {
    pub fn selection(&self) -> ModelSelection {
        ModelSelection {
            listen: self.listen,
            think: self.think,
            speak: self.speak,
            prompt: self.prompt.clone().filter(|p| !p.trim().is_empty()),
            greeting: Some(self.greeting.clone()).filter(|g| !g.trim().is_empty()),
        }
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Samples per captured frame
    pub capture_window: usize,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    /// Captured frames buffered ahead of the transport before frames are dropped
    pub inbox_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            capture_window: DEFAULT_WINDOW_SIZE,
            input_device: None,
            output_device: None,
            inbox_capacity: 32,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Directory for per-session WAV dumps of agent speech; disabled when unset
    pub directory: Option<PathBuf>,
}

impl Config {
    /// Load configuration from an optional file, layered with `VOICE_AGENT__*` environment variables
    ///
    /// `path` may omit the extension, as accepted by [`config::File::with_name`].
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to load configuration from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }
}
