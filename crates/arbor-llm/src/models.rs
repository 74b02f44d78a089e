//! # Model Registry
//!
//! Static table of known models: provider, context-window size, and cost
//! rates. This is the only process-wide model knowledge in the system; the
//! context manager uses it to derive window limits and provider types, and
//! the gateway uses it to validate model switches.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which provider serves a model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Anthropic (Claude).
    Anthropic,
    /// `OpenAI` (GPT).
    #[serde(rename = "openai")]
    OpenAi,
    /// Google (Gemini).
    Google,
}

impl ProviderKind {
    /// Canonical wire string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Google => "google",
        }
    }

    /// Name of the API-key environment variable for this provider.
    #[must_use]
    pub fn api_key_env(self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Google => "GEMINI_API_KEY",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registry entry for one model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelInfo {
    /// Model ID as used on the wire.
    pub id: &'static str,
    /// Serving provider.
    pub provider: ProviderKind,
    /// Context-window size in tokens.
    pub context_window: u64,
    /// Input cost in USD per million tokens.
    pub input_cost_per_mtok: f64,
    /// Output cost in USD per million tokens.
    pub output_cost_per_mtok: f64,
}

/// Context-window size assumed for models missing from the registry.
pub const DEFAULT_CONTEXT_WINDOW: u64 = 200_000;

/// All known models.
pub const MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "claude-opus-4-1",
        provider: ProviderKind::Anthropic,
        context_window: 200_000,
        input_cost_per_mtok: 15.0,
        output_cost_per_mtok: 75.0,
    },
    ModelInfo {
        id: "claude-sonnet-4-5",
        provider: ProviderKind::Anthropic,
        context_window: 200_000,
        input_cost_per_mtok: 3.0,
        output_cost_per_mtok: 15.0,
    },
    ModelInfo {
        id: "claude-haiku-4-5",
        provider: ProviderKind::Anthropic,
        context_window: 200_000,
        input_cost_per_mtok: 1.0,
        output_cost_per_mtok: 5.0,
    },
    ModelInfo {
        id: "gpt-5",
        provider: ProviderKind::OpenAi,
        context_window: 400_000,
        input_cost_per_mtok: 1.25,
        output_cost_per_mtok: 10.0,
    },
    ModelInfo {
        id: "gpt-5-mini",
        provider: ProviderKind::OpenAi,
        context_window: 400_000,
        input_cost_per_mtok: 0.25,
        output_cost_per_mtok: 2.0,
    },
    ModelInfo {
        id: "gemini-2.5-pro",
        provider: ProviderKind::Google,
        context_window: 1_000_000,
        input_cost_per_mtok: 1.25,
        output_cost_per_mtok: 10.0,
    },
    ModelInfo {
        id: "gemini-2.5-flash",
        provider: ProviderKind::Google,
        context_window: 1_000_000,
        input_cost_per_mtok: 0.30,
        output_cost_per_mtok: 2.50,
    },
];

/// Look up a model by exact ID.
#[must_use]
pub fn lookup_model(model_id: &str) -> Option<&'static ModelInfo> {
    MODELS.iter().find(|m| m.id == model_id)
}

/// Detect which provider serves a model.
///
/// Resolution order: exact registry match, then name-family prefix. Unknown
/// models return `None` (strict fail-fast behaviour).
#[must_use]
pub fn detect_provider(model_id: &str) -> Option<ProviderKind> {
    if let Some(info) = lookup_model(model_id) {
        return Some(info.provider);
    }
    if model_id.starts_with("claude-") {
        return Some(ProviderKind::Anthropic);
    }
    if model_id.starts_with("gpt-") {
        return Some(ProviderKind::OpenAi);
    }
    if model_id.starts_with("gemini-") {
        return Some(ProviderKind::Google);
    }
    None
}

/// Context-window size for a model, falling back to
/// [`DEFAULT_CONTEXT_WINDOW`] for models missing from the registry.
#[must_use]
pub fn context_window(model_id: &str) -> u64 {
    lookup_model(model_id).map_or(DEFAULT_CONTEXT_WINDOW, |m| m.context_window)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
