//! Projected state types.
//!
//! These are the outputs of [`project_state`](crate::projection::project_state)
//! and of search queries. Projected messages keep their content as loose JSON
//! because merging and compaction operate structurally; the runtime converts
//! them to the typed conversation model before calling a provider.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use arbor_core::{ReasoningLevel, TokenUsage};

/// A message rebuilt from the event log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedMessage {
    /// `"user"`, `"assistant"` or `"toolResult"`.
    pub role: String,
    /// String or content-block array.
    pub content: Value,
    /// Tool call ID (tool results only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Error flag (tool results only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

/// A projected message together with the IDs of the events that produced it.
///
/// Merged messages carry one entry per contributing event so that any of them
/// may still be individually deleted. Synthetic messages (compaction pair,
/// tool-result interleave) carry `None` entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedMessageWithIds {
    /// The message.
    pub message: ProjectedMessage,
    /// Originating event IDs, in contribution order.
    pub event_ids: Vec<Option<String>>,
}

/// Deterministic session state at an event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// Canonicalised message list with provenance.
    pub messages: Vec<ProjectedMessageWithIds>,
    /// Token usage summed over kept assistant messages.
    pub token_usage: TokenUsage,
    /// Latest model (switch target, or the session-start model).
    pub model: String,
    /// Latest reasoning level (defaults to medium).
    pub reasoning_level: ReasoningLevel,
    /// Working directory from `session.start`.
    pub working_directory: String,
    /// Highest turn number seen.
    pub turn_count: i64,
}

impl SessionState {
    /// An empty state (no `session.start` seen).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            messages: Vec::new(),
            token_usage: TokenUsage::default(),
            model: String::new(),
            reasoning_level: ReasoningLevel::default(),
            working_directory: String::new(),
            turn_count: 0,
        }
    }
}

/// A full-text search hit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Matching event ID.
    pub event_id: String,
    /// Owning session ID.
    pub session_id: String,
    /// Event type string.
    pub event_type: String,
    /// Snippet with match markers.
    pub snippet: String,
    /// bm25 rank (lower is better).
    pub rank: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_state_defaults() {
        let s = SessionState::empty();
        assert!(s.messages.is_empty());
        assert_eq!(s.token_usage, TokenUsage::default());
        assert_eq!(s.reasoning_level, ReasoningLevel::Medium);
        assert_eq!(s.turn_count, 0);
    }

    #[test]
    fn projected_message_wire_format() {
        let m = ProjectedMessage {
            role: "toolResult".into(),
            content: serde_json::json!("ok"),
            tool_call_id: Some("call_1".into()),
            is_error: Some(false),
        };
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["toolCallId"], "call_1");
        assert_eq!(json["isError"], false);
    }

    #[test]
    fn state_serializes_camel_case() {
        let s = SessionState {
            model: "claude-sonnet-4-5".into(),
            working_directory: "/p".into(),
            ..SessionState::empty()
        };
        let json = serde_json::to_value(&s).unwrap();
        assert!(json.get("tokenUsage").is_some());
        assert!(json.get("reasoningLevel").is_some());
        assert!(json.get("workingDirectory").is_some());
    }
}
