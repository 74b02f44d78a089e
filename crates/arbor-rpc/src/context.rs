//! Shared handler context and error mapping.

use std::sync::Arc;

use arbor_core::{RpcError, RpcErrorCode};
use arbor_events::{EventStore, EventStoreError};
use arbor_runtime::{RuntimeError, SessionManager};

/// Everything a handler needs.
#[derive(Clone)]
pub struct RpcContext {
    /// Live-session registry (owns the store and bus).
    pub sessions: Arc<SessionManager>,
    /// Default model for `session.create` when the client omits one.
    pub default_model: String,
}

impl RpcContext {
    /// Create a context.
    pub fn new(sessions: Arc<SessionManager>, default_model: impl Into<String>) -> Self {
        Self {
            sessions,
            default_model: default_model.into(),
        }
    }

    /// The shared event store.
    #[must_use]
    pub fn store(&self) -> &Arc<EventStore> {
        self.sessions.store()
    }
}

/// Map a store error onto the RPC error taxonomy.
pub fn map_store_error(err: &EventStoreError) -> RpcError {
    match err {
        EventStoreError::SessionNotFound(id) => RpcError::session_not_found(id),
        EventStoreError::EventNotFound(id) | EventStoreError::ParentNotFound(id) => {
            RpcError::event_not_found(id)
        }
        EventStoreError::SessionEnded(id) => RpcError::session_ended(id),
        EventStoreError::InvalidOperation(msg) => {
            RpcError::new(RpcErrorCode::ValidationError, msg.clone())
        }
        other => RpcError::internal(other.to_string()),
    }
}

/// Map a runtime error onto the RPC error taxonomy.
pub fn map_runtime_error(err: &RuntimeError) -> RpcError {
    match err {
        RuntimeError::Store(store_err) => map_store_error(store_err),
        RuntimeError::TurnActive(id) => RpcError::new(
            RpcErrorCode::ValidationError,
            format!("a turn is already running for session {id}"),
        ),
        RuntimeError::SessionUnhealthy(id) => RpcError::new(
            RpcErrorCode::SessionUnhealthy,
            format!("session {id} rejects new turns until resumed"),
        ),
        other => RpcError::internal(other.to_string()),
    }
}
