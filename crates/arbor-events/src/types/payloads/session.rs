//! Session lifecycle payloads: start, end, fork.

use serde::{Deserialize, Serialize};

/// Payload for `session.start` events (the root of every session).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartPayload {
    /// Canonical workspace path.
    pub workspace_path: String,
    /// Working directory for the session.
    pub working_directory: String,
    /// Initial model ID.
    pub model: String,
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEndReason {
    /// Ended normally.
    Completed,
    /// Aborted by the user (also used by the soft RPC delete).
    Aborted,
    /// Ended because of an unrecoverable error.
    Error,
    /// Ended by timeout.
    Timeout,
}

/// Payload for `session.end` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEndPayload {
    /// End reason.
    pub reason: SessionEndReason,
}

/// Payload for `session.fork` events (the root of a forked session).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionForkPayload {
    /// Session the fork descends from.
    pub parent_session_id: String,
    /// Event the fork branches at.
    pub fork_from_event_id: String,
    /// Optional fork name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}
