//! Streaming event payloads: turn start/end, text/thinking deltas.
//!
//! Streaming events are optional artefacts for late-joining subscribers to
//! reconstruct an in-progress turn; projection ignores them.

use serde::{Deserialize, Serialize};

use arbor_core::TokenUsage;

/// Payload for `stream.turn_start` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamTurnStartPayload {
    /// Turn number.
    pub turn: i64,
}

/// Payload for `stream.turn_end` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamTurnEndPayload {
    /// Turn number.
    pub turn: i64,
    /// Token usage for this turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    /// Why the model stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

/// Payload for `stream.text_delta` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamTextDeltaPayload {
    /// Text fragment.
    pub delta: String,
    /// Turn number.
    pub turn: i64,
}

/// Payload for `stream.thinking_delta` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamThinkingDeltaPayload {
    /// Thinking text fragment.
    pub delta: String,
    /// Turn number.
    pub turn: i64,
}

/// Payload for `stream.thinking_complete` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamThinkingCompletePayload {
    /// The full thinking text.
    pub thinking: String,
    /// Turn number.
    pub turn: i64,
}
