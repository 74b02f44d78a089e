//! # Provider Trait
//!
//! Core abstraction for LLM backends. Every concrete provider (Anthropic,
//! `OpenAI`, Google) implements [`Provider`] to expose a unified streaming
//! interface.
//!
//! The trait returns a boxed [`Stream`] of [`ProviderEvent`]s. The sequence
//! is finite and not restartable; cancellation is expressed by dropping the
//! stream, and the adapter must close the underlying connection within a
//! bounded time after the consumer stops.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use arbor_core::{AssistantContent, StopReason, TokenUsage, ToolCall, TurnContext};

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Boxed stream of [`ProviderEvent`]s returned by [`Provider::stream`].
pub type ProviderEventStream =
    Pin<Box<dyn Stream<Item = Result<ProviderEvent, ProviderError>> + Send>>;

/// Errors that can occur during provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Authentication failed (expired token, invalid key, etc.).
    #[error("Auth error: {message}")]
    Auth {
        /// Error description.
        message: String,
    },

    /// Rate limited by the provider.
    #[error("Rate limited: retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested retry delay in milliseconds.
        retry_after_ms: u64,
        /// Error description.
        message: String,
    },

    /// Provider returned an API error.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description.
        message: String,
        /// Provider-specific error code.
        code: Option<String>,
        /// Whether this error can be retried.
        retryable: bool,
    },

    /// Requested model is not served by any configured provider.
    #[error("Unknown model: {model}")]
    UnknownModel {
        /// The model ID.
        model: String,
    },

    /// Stream was cancelled.
    #[error("Stream cancelled")]
    Cancelled,

    /// Provider-specific error.
    #[error("{message}")]
    Other {
        /// Error description.
        message: String,
    },
}

impl ProviderError {
    /// Whether this error is transient and the turn may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status()
                        .is_some_and(|s| s == reqwest::StatusCode::TOO_MANY_REQUESTS || s.is_server_error())
            }
            Self::RateLimited { .. } => true,
            Self::Api { retryable, .. } => *retryable,
            Self::Auth { .. }
            | Self::UnknownModel { .. }
            | Self::Cancelled
            | Self::Json(_)
            | Self::Other { .. } => false,
        }
    }

    /// Error category string for `error.provider` payloads.
    pub fn code(&self) -> &str {
        match self {
            Self::Http(_) => "network",
            Self::Json(_) => "parse",
            Self::Auth { .. } => "auth",
            Self::RateLimited { .. } => "rate_limit",
            Self::Api { .. } => "api",
            Self::UnknownModel { .. } => "model_not_found",
            Self::Cancelled => "cancelled",
            Self::Other { .. } => "unknown",
        }
    }
}

/// The assistant message assembled by a provider adapter when its stream
/// completes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedMessage {
    /// Content blocks (text / thinking / tool_use).
    pub content: Vec<AssistantContent>,
    /// Normalised token usage (cache fields default to zero when the
    /// provider does not expose them).
    pub usage: TokenUsage,
    /// Why the model stopped.
    pub stop_reason: StopReason,
    /// Model that produced the message.
    pub model: String,
}

/// Events emitted by a provider stream.
#[derive(Clone, Debug, PartialEq)]
pub enum ProviderEvent {
    /// Stream opened.
    Start,
    /// Text fragment.
    TextDelta {
        /// The fragment.
        delta: String,
    },
    /// Thinking fragment.
    ThinkingDelta {
        /// The fragment.
        delta: String,
    },
    /// A tool call started streaming.
    ToolCallStart {
        /// Tool call ID.
        tool_call_id: String,
        /// Tool name.
        name: String,
    },
    /// A tool call finished streaming and parsed cleanly.
    ToolCallEnd {
        /// The complete tool call.
        tool_call: ToolCall,
    },
    /// The stream completed.
    Done {
        /// The assembled assistant message.
        message: CompletedMessage,
    },
    /// The provider reported an error; the stream ends after this.
    Error {
        /// Machine-readable code (e.g. `"rate_limit"`).
        code: String,
        /// Human-readable message.
        message: String,
    },
}

/// Core LLM provider trait.
///
/// Implementors must be `Send + Sync` for use across tasks.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider identifier (e.g. `"anthropic"`).
    fn provider_kind(&self) -> crate::models::ProviderKind;

    /// Current model ID.
    fn model(&self) -> &str;

    /// Stream a response for the given context.
    ///
    /// The caller consumes events until [`ProviderEvent::Done`] or
    /// [`ProviderEvent::Error`].
    async fn stream(&self, context: &TurnContext) -> ProviderResult<ProviderEventStream>;
}

/// Factory for creating providers on demand.
///
/// Called once per turn to create a fresh provider matching the session's
/// current model, so model switches take effect immediately and credentials
/// are always current.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    /// Create a provider for the given model ID.
    ///
    /// Returns [`ProviderError::UnknownModel`] when no configured provider
    /// serves the model, and [`ProviderError::Auth`] when credentials are
    /// missing for its provider.
    async fn create_for_model(&self, model: &str) -> ProviderResult<Arc<dyn Provider>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_is_retryable() {
        let err = ProviderError::RateLimited {
            retry_after_ms: 5000,
            message: "Too many requests".into(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.code(), "rate_limit");
    }

    #[test]
    fn api_error_retryability_is_explicit() {
        let transient = ProviderError::Api {
            status: 500,
            message: "Internal server error".into(),
            code: None,
            retryable: true,
        };
        assert!(transient.is_retryable());

        let fatal = ProviderError::Api {
            status: 400,
            message: "Bad request".into(),
            code: Some("invalid_request".into()),
            retryable: false,
        };
        assert!(!fatal.is_retryable());
    }

    #[test]
    fn auth_and_unknown_model_are_fatal() {
        assert!(!ProviderError::Auth { message: "expired".into() }.is_retryable());
        assert!(
            !ProviderError::UnknownModel {
                model: "mystery-model".into()
            }
            .is_retryable()
        );
        assert_eq!(
            ProviderError::UnknownModel {
                model: "mystery-model".into()
            }
            .code(),
            "model_not_found"
        );
    }

    #[test]
    fn cancelled_is_not_retryable() {
        assert!(!ProviderError::Cancelled.is_retryable());
        assert_eq!(ProviderError::Cancelled.code(), "cancelled");
    }

    #[test]
    fn error_display() {
        let err = ProviderError::Api {
            status: 429,
            message: "Rate limited".into(),
            code: None,
            retryable: true,
        };
        assert_eq!(err.to_string(), "API error (429): Rate limited");
    }

    #[test]
    fn completed_message_wire_format() {
        let msg = CompletedMessage {
            content: vec![AssistantContent::text("hi")],
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 2,
                ..Default::default()
            },
            stop_reason: StopReason::EndTurn,
            model: "claude-sonnet-4-5".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["stopReason"], "end_turn");
        assert_eq!(json["usage"]["inputTokens"], 10);
    }

    #[test]
    fn provider_trait_is_object_safe() {
        fn assert_object_safe(_: &dyn Provider) {}
        let _ = assert_object_safe;
    }
}
