//! Access tokens for the agent socket
//!
//! Two sources are supported: an HTTP endpoint that hands out short-lived
//! tokens (`GET` returning `{"token": "..."}`), and a direct grant against the
//! agent provider using an API key read from the environment.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::AuthConfig;
use crate::error::AuthError;

pub const DEFAULT_GRANT_URL: &str = "https://api.deepgram.com/v1/auth/grant";
pub const DEFAULT_API_KEY_ENV: &str = "DEEPGRAM_API_KEY";
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Short-lived credential presented when opening the agent connection
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccessToken").field(&"[REDACTED]").finish()
    }
}

/// Anything that can produce an [`AccessToken`]
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<AccessToken, AuthError>;

    /// Where tokens come from, for logging
    fn describe(&self) -> String;
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

/// Token-issuing HTTP endpoint
pub struct HttpTokenSource {
    client: reqwest::Client,
    url: String,
}

impl HttpTokenSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: build_http_client(),
            url: url.into(),
        }
    }
}

#[async_trait::async_trait]
impl TokenSource for HttpTokenSource {
    async fn fetch_token(&self) -> Result<AccessToken, AuthError> {
        debug!("Requesting token from {}", self.url);

        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status != reqwest::StatusCode::OK {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        if parsed.token.is_empty() {
            return Err(AuthError::InvalidResponse("empty token".to_string()));
        }

        info!("Obtained access token from {}", self.url);
        Ok(AccessToken(parsed.token))
    }

    fn describe(&self) -> String {
        format!("token endpoint {}", self.url)
    }
}

#[derive(Serialize)]
struct GrantRequest {
    ttl_seconds: u64,
}

#[derive(Deserialize)]
struct GrantResponse {
    access_token: String,
}

/// Direct token grant using a provider API key
///
/// The key is read from the environment on every fetch so it never lives in
/// configuration files.
pub struct ApiKeyGrant {
    client: reqwest::Client,
    grant_url: String,
    api_key_env: String,
    ttl_seconds: u64,
}

impl ApiKeyGrant {
    pub fn new(grant_url: impl Into<String>, api_key_env: impl Into<String>, ttl_seconds: u64) -> Self {
        Self {
            client: build_http_client(),
            grant_url: grant_url.into(),
            api_key_env: api_key_env.into(),
            ttl_seconds,
        }
    }

    fn api_key(&self) -> Result<String, AuthError> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.is_empty() => Ok(key),
            _ => Err(AuthError::MissingApiKey(self.api_key_env.clone())),
        }
    }
}

#[async_trait::async_trait]
impl TokenSource for ApiKeyGrant {
    async fn fetch_token(&self) -> Result<AccessToken, AuthError> {
        let key = self.api_key()?;

        debug!("Requesting token grant (ttl {}s)", self.ttl_seconds);

        let response = self
            .client
            .post(&self.grant_url)
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", key))
            .json(&GrantRequest {
                ttl_seconds: self.ttl_seconds,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body: format!("Error generating token: {}", body),
            });
        }

        let grant: GrantResponse = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        info!("Obtained access token by API key grant");
        Ok(AccessToken(grant.access_token))
    }

    fn describe(&self) -> String {
        format!("API key grant ({})", self.api_key_env)
    }
}

/// Pick the token source described by configuration
///
/// A configured token URL wins; otherwise tokens are granted directly.
pub fn token_source_from_config(config: &AuthConfig) -> Box<dyn TokenSource> {
    match config.token_url.as_deref() {
        Some(url) if !url.is_empty() => Box::new(HttpTokenSource::new(url)),
        _ => Box::new(ApiKeyGrant::new(
            config.grant_url.clone(),
            config.api_key_env.clone(),
            config.ttl_seconds,
        )),
    }
}

fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("voice-agent/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_debug_is_redacted() {
        let token = AccessToken::new("super-secret");
        let printed = format!("{:?}", token);
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("REDACTED"));
        assert_eq!(token.secret(), "super-secret");
    }

    #[test]
    fn test_source_selection() {
        let mut config = AuthConfig::default();
        config.token_url = Some("http://localhost:3000/api/token".to_string());
        assert!(token_source_from_config(&config)
            .describe()
            .contains("localhost:3000"));

        config.token_url = None;
        assert!(token_source_from_config(&config)
            .describe()
            .contains(DEFAULT_API_KEY_ENV));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let grant = ApiKeyGrant::new(DEFAULT_GRANT_URL, "VOICE_AGENT_TEST_UNSET_KEY", 60);
        let err = grant.fetch_token().await.unwrap_err();
        assert!(matches!(err, AuthError::MissingApiKey(ref name) if name == "VOICE_AGENT_TEST_UNSET_KEY"));
    }
}
