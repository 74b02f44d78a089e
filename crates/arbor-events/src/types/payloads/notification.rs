//! Notification payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload for `notification.interrupted` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationInterruptedPayload {
    /// Turn number the interrupt landed in.
    pub turn: i64,
    /// Partial assistant text accumulated before the interrupt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_content: Option<String>,
}

/// Payload for `notification.subagent_result` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSubagentResultPayload {
    /// Session the subagent ran in.
    pub subagent_session_id: String,
    /// Opaque result payload.
    pub result: Value,
}
