//! # arbor-events
//!
//! Append-only event log for agent sessions, with `SQLite` persistence and
//! deterministic state projection.
//!
//! Responsibilities:
//!
//! - **Event types**: the closed [`EventType`] enum of wire-stable strings,
//!   with an `Unknown` passthrough for forward compatibility
//! - **Session events**: [`SessionEvent`] flat struct with typed payload access
//! - **Event store**: session creation, transactional append, ancestor walk,
//!   fork, soft message deletion, full-text search
//! - **Projection**: pure two-pass fold from an ancestor chain to a
//!   [`SessionState`], including deletion filtering and same-role merging
//! - **Migrations**: version-tracked SQL schema evolution

#![deny(unsafe_code)]

pub mod errors;
pub mod projection;
pub mod sqlite;
pub mod store;
pub mod types;

pub use errors::{EventStoreError, Result};
pub use projection::{
    COMPACTION_ACK_TEXT, COMPACTION_SUMMARY_PREFIX, INTERRUPTED_TOOL_RESULT_TEXT, project_state,
};
pub use sqlite::{
    ConnectionConfig, ConnectionPool, PooledConnection, new_file, new_in_memory, run_migrations,
};
pub use store::{AppendOptions, CreateSessionResult, EventStore, ForkOptions, ForkResult};
pub use types::{
    EventType, ProjectedMessage, ProjectedMessageWithIds, SearchResult, SessionEvent,
    SessionState,
};
