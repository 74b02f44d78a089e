//! Error types for the event store subsystem.
//!
//! [`EventStoreError`] is the primary error type returned by all event store
//! operations. It provides specific variants for common failure modes while
//! keeping the surface area small enough for exhaustive pattern matching.

use thiserror::Error;

/// Errors that can occur during event store operations.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// Requested session was not found.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Requested event was not found.
    #[error("event not found: {0}")]
    EventNotFound(String),

    /// Explicit parent event does not exist.
    #[error("parent event not found: {0}")]
    ParentNotFound(String),

    /// Requested workspace was not found.
    #[error("workspace not found: {0}")]
    WorkspaceNotFound(String),

    /// Session has ended and rejects further appends.
    #[error("session has ended: {0}")]
    SessionEnded(String),

    /// Invalid operation on the event store.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Convenience type alias for event store results.
pub type Result<T> = std::result::Result<T, EventStoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
