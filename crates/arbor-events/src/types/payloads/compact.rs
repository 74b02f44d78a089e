//! Compaction event payloads: boundary, summary.

use serde::{Deserialize, Serialize};

/// Payload for `compact.boundary` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactBoundaryPayload {
    /// Tokens removed by the compaction.
    pub tokens_removed: i64,
    /// Messages removed by the compaction.
    pub messages_removed: i64,
    /// What triggered the compaction.
    pub trigger: String,
}

/// Payload for `compact.summary` events.
///
/// Always written together with its boundary in one atomic multi-append.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactSummaryPayload {
    /// Textual summary replacing the removed messages.
    pub summary: String,
    /// Event ID of the corresponding boundary event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boundary_event_id: Option<String>,
}
