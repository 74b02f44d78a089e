//! Server configuration from the environment.
//!
//! Read via figment's Env provider: `PORT`, `HOST`, `DATABASE_PATH`,
//! `WORKSPACE_ROOT`, plus one API-key variable per supported provider
//! (`ANTHROPIC_API_KEY`, `OPENAI_API_KEY`, `GEMINI_API_KEY`). API keys are
//! optional at startup — a missing key surfaces as an auth failure when a
//! turn first needs that provider.

use figment::Figment;
use figment::providers::{Env, Serialized};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration loading failures. Exit code 2 territory.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The environment contained an unusable value.
    #[error("bad configuration: {0}")]
    Invalid(String),
}

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (0 auto-assigns).
    pub port: u16,
    /// Path to the event database file.
    pub database_path: String,
    /// Root directory under which workspaces live.
    pub workspace_root: String,
    /// Anthropic API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anthropic_api_key: Option<String>,
    /// `OpenAI` API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    /// Gemini API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 4680,
            database_path: "arbor.db".into(),
            workspace_root: ".".into(),
            anthropic_api_key: None,
            openai_api_key: None,
            gemini_api_key: None,
        }
    }
}

impl ServerConfig {
    /// Load from process environment over defaults.
    ///
    /// `PORT=8080 HOST=0.0.0.0 DATABASE_PATH=/data/arbor.db …`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Self::default()))
                .merge(Env::raw().only(&[
                    "HOST",
                    "PORT",
                    "DATABASE_PATH",
                    "WORKSPACE_ROOT",
                    "ANTHROPIC_API_KEY",
                    "OPENAI_API_KEY",
                    "GEMINI_API_KEY",
                ])),
        )
    }

    fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment
            .extract()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if config.workspace_root.is_empty() {
            return Err(ConfigError::Invalid("WORKSPACE_ROOT must not be empty".into()));
        }
        if config.database_path.is_empty() {
            return Err(ConfigError::Invalid("DATABASE_PATH must not be empty".into()));
        }
        Ok(config)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
