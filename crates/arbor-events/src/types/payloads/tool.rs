//! Tool event payloads: call, result.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload for `tool.call` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallPayload {
    /// Tool call ID.
    pub tool_call_id: String,
    /// Tool name.
    pub name: String,
    /// Tool arguments.
    pub arguments: Value,
    /// Turn number.
    pub turn: i64,
}

/// Payload for `tool.result` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultPayload {
    /// Tool call ID this result corresponds to.
    pub tool_call_id: String,
    /// Result content (string or blocks).
    pub content: Value,
    /// Whether the tool execution errored.
    pub is_error: bool,
    /// Duration in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_payload_roundtrip() {
        let p = ToolCallPayload {
            tool_call_id: "call_1".into(),
            name: "bash".into(),
            arguments: json!({"command": "ls"}),
            turn: 1,
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["toolCallId"], "call_1");
        assert_eq!(json["arguments"]["command"], "ls");
        let back: ToolCallPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn result_payload_error_flag() {
        let p = ToolResultPayload {
            tool_call_id: "call_1".into(),
            content: json!("permission denied"),
            is_error: true,
            duration: Some(12),
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["isError"], true);
        assert_eq!(json["duration"], 12);
    }
}
