//! Config event payloads: model switch, reasoning level.

use serde::{Deserialize, Serialize};

/// Payload for `config.model_switch` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigModelSwitchPayload {
    /// Previous model ID.
    pub previous_model: String,
    /// New model ID.
    pub new_model: String,
}

/// Payload for `config.reasoning_level` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigReasoningLevelPayload {
    /// Previous reasoning level (absent before the first switch).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_level: Option<String>,
    /// New reasoning level.
    pub new_level: String,
}
