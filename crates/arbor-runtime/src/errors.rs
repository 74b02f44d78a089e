//! Runtime error types.

use thiserror::Error;

use arbor_events::EventStoreError;
use arbor_llm::ProviderError;

/// Errors surfaced by the runtime layer.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Event persistence failed (or the persister has latched).
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Event store operation failed.
    #[error("store error: {0}")]
    Store(#[from] EventStoreError),

    /// Provider operation failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// JSON serialization failed.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The per-turn timeout elapsed.
    #[error("turn timed out after {0:?}")]
    TurnTimeout(std::time::Duration),

    /// A turn is already running for this session.
    #[error("turn already active for session {0}")]
    TurnActive(String),

    /// The session failed to record a `turn.failed` event and rejects new
    /// turns until it is resumed.
    #[error("session unhealthy until resume: {0}")]
    SessionUnhealthy(String),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}
