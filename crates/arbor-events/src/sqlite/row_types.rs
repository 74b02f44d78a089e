//! Database row types for mapping between `SQLite` rows and Rust structs.
//!
//! These represent the raw database row shape — not the public API types.
//! The `payload` column stays a JSON string here; conversion to
//! [`SessionEvent`](crate::types::SessionEvent) happens in the store layer.

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::types::{EventType, SessionEvent};

/// Raw session row from the `sessions` table.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRow {
    /// Session ID.
    pub id: String,
    /// Workspace ID.
    pub workspace_id: String,
    /// Head event ID (the current tip).
    pub head_event_id: Option<String>,
    /// Root event ID.
    pub root_event_id: Option<String>,
    /// Session title.
    pub title: Option<String>,
    /// Latest model ID.
    pub latest_model: String,
    /// Latest reasoning level.
    pub latest_reasoning_level: Option<String>,
    /// Working directory.
    pub working_directory: String,
    /// Parent session ID (for forks).
    pub parent_session_id: Option<String>,
    /// Fork point event ID.
    pub fork_from_event_id: Option<String>,
    /// Creation timestamp.
    pub created_at: String,
    /// Last activity timestamp.
    pub last_activity_at: String,
    /// End timestamp (null if active).
    pub ended_at: Option<String>,
    /// Cached event count.
    pub event_count: i64,
    /// Cached message count.
    pub message_count: i64,
    /// Cached total input tokens.
    pub total_input_tokens: i64,
    /// Cached total output tokens.
    pub total_output_tokens: i64,
    /// Cached total cache read tokens.
    pub total_cache_read_tokens: i64,
    /// Cached total cache creation tokens.
    pub total_cache_creation_tokens: i64,
}

impl SessionRow {
    /// Whether the session is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Raw event row from the `events` table.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRow {
    /// Event ID.
    pub id: String,
    /// Session ID.
    pub session_id: String,
    /// Parent event ID.
    pub parent_id: Option<String>,
    /// Sequence number.
    pub sequence: i64,
    /// Event type string.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Timestamp.
    pub timestamp: String,
    /// Payload JSON.
    pub payload: String,
    /// Workspace ID.
    pub workspace_id: String,
    /// Denormalized role.
    pub role: Option<String>,
    /// Denormalized tool name.
    pub tool_name: Option<String>,
    /// Denormalized tool call ID.
    pub tool_call_id: Option<String>,
    /// Denormalized turn number.
    pub turn: Option<i64>,
    /// Denormalized input tokens.
    pub input_tokens: Option<i64>,
    /// Denormalized output tokens.
    pub output_tokens: Option<i64>,
    /// Denormalized cache read tokens.
    pub cache_read_tokens: Option<i64>,
    /// Denormalized cache creation tokens.
    pub cache_creation_tokens: Option<i64>,
}

impl EventRow {
    /// Convert the row into a typed [`SessionEvent`], parsing the payload.
    pub fn into_session_event(self) -> Result<SessionEvent> {
        let payload = serde_json::from_str(&self.payload)?;
        let event_type: EventType = self
            .event_type
            .parse()
            .unwrap_or(EventType::Unknown(self.event_type.clone()));
        Ok(SessionEvent {
            id: self.id,
            parent_id: self.parent_id,
            session_id: self.session_id,
            workspace_id: self.workspace_id,
            timestamp: self.timestamp,
            event_type,
            sequence: self.sequence,
            payload,
        })
    }
}

/// Raw workspace row from the `workspaces` table.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRow {
    /// Workspace ID.
    pub id: String,
    /// Canonical absolute path (unique).
    pub path: String,
    /// Display name.
    pub name: Option<String>,
    /// Creation timestamp.
    pub created_at: String,
    /// Last activity timestamp.
    pub last_activity_at: String,
}

/// Raw blob row from the `blobs` table.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobRow {
    /// Blob ID.
    pub id: String,
    /// Content hash (SHA-256 hex).
    pub hash: String,
    /// Blob content.
    #[serde(skip)]
    pub content: Vec<u8>,
    /// MIME type.
    pub mime_type: String,
    /// Content size in bytes.
    pub size: i64,
    /// Creation timestamp.
    pub created_at: String,
}
