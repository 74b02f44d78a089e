//! Error event payloads: agent, tool, provider.

use serde::{Deserialize, Serialize};

/// Payload for `error.agent` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorAgentPayload {
    /// Error description.
    pub error: String,
}

/// Payload for `error.tool` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorToolPayload {
    /// Tool call ID.
    pub tool_call_id: String,
    /// Tool name.
    pub name: String,
    /// Error description.
    pub error: String,
}

/// Payload for `error.provider` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorProviderPayload {
    /// Provider error code (e.g. `"rate_limit"`).
    pub code: String,
    /// Error description.
    pub message: String,
}
