//! Turn event payloads.

use serde::{Deserialize, Serialize};

/// Payload for `turn.failed` events.
///
/// Every failed turn produces exactly one of these so that projection and
/// replay stay consistent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnFailedPayload {
    /// Turn number.
    pub turn: i64,
    /// Error description.
    pub error: String,
    /// Machine-readable failure code (e.g. `"timeout"`, `"rate_limit"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Whether the caller may retry the turn.
    pub recoverable: bool,
}
