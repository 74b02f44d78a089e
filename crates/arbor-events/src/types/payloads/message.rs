//! Message payloads: user, assistant, deleted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use arbor_core::TokenUsage;

/// Payload for `message.user` events.
///
/// `content` is either a plain string or an array of content blocks; it is
/// kept opaque here because projection merges it structurally.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMessagePayload {
    /// String or content-block array.
    pub content: Value,
    /// Turn number.
    pub turn: i64,
}

/// Payload for `message.assistant` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantMessagePayload {
    /// Content-block array (text / thinking / tool_use).
    pub content: Value,
    /// Turn number.
    pub turn: i64,
    /// Token usage for the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    /// Why the model stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    /// Model that produced the message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Payload for `message.deleted` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeletedPayload {
    /// Event whose message is removed from projection.
    pub target_event_id: String,
    /// Type of the target event.
    pub target_type: String,
}
