//! RPC error types.
//!
//! Typed error codes for the gateway, eliminating string-based error
//! detection. Each error carries a machine-readable code that is stable on
//! the wire.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Centralized RPC error codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RpcErrorCode {
    /// Invalid parameters.
    #[serde(rename = "INVALID_PARAMS")]
    InvalidParams,
    /// Schema-level validation failure.
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
    /// Internal server error.
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    /// Method not found.
    #[serde(rename = "METHOD_NOT_FOUND")]
    MethodNotFound,
    /// Session not found.
    #[serde(rename = "SESSION_NOT_FOUND")]
    SessionNotFound,
    /// Event not found.
    #[serde(rename = "EVENT_NOT_FOUND")]
    EventNotFound,
    /// Session has ended and cannot accept appends.
    #[serde(rename = "SESSION_ENDED")]
    SessionEnded,
    /// Session failed to record a turn failure and rejects new turns until
    /// resumed.
    #[serde(rename = "SESSION_UNHEALTHY")]
    SessionUnhealthy,
}

impl RpcErrorCode {
    /// Canonical wire string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidParams => "INVALID_PARAMS",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
            Self::MethodNotFound => "METHOD_NOT_FOUND",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::EventNotFound => "EVENT_NOT_FOUND",
            Self::SessionEnded => "SESSION_ENDED",
            Self::SessionUnhealthy => "SESSION_UNHEALTHY",
        }
    }
}

impl fmt::Display for RpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base RPC error.
#[derive(Clone, Debug)]
pub struct RpcError {
    /// Machine-readable error code.
    pub code: RpcErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

impl RpcError {
    /// Create a new RPC error.
    #[must_use]
    pub fn new(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Invalid parameters.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InvalidParams, message)
    }

    /// Session not found.
    #[must_use]
    pub fn session_not_found(session_id: &str) -> Self {
        Self::new(
            RpcErrorCode::SessionNotFound,
            format!("Session not found: {session_id}"),
        )
    }

    /// Event not found.
    #[must_use]
    pub fn event_not_found(event_id: &str) -> Self {
        Self::new(
            RpcErrorCode::EventNotFound,
            format!("Event not found: {event_id}"),
        )
    }

    /// Session ended.
    #[must_use]
    pub fn session_ended(session_id: &str) -> Self {
        Self::new(
            RpcErrorCode::SessionEnded,
            format!("Session has ended: {session_id}"),
        )
    }

    /// Internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InternalError, message)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
