//! The [`SessionEvent`] struct — the core persisted event type.
//!
//! Events are stored as a flat struct with base fields at the top level and a
//! `payload` kept as opaque [`serde_json::Value`] for exact wire
//! compatibility. Typed access to the payload is opt-in via
//! [`SessionEvent::typed_payload()`], which dispatches on [`EventType`] and
//! deserializes into the appropriate payload struct.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::event_type::EventType;
use super::payloads;

/// A persisted session event.
///
/// The canonical wire format has base fields (`id`, `parentId`, `sessionId`,
/// etc.) at the top level and a `payload` JSON object. Events are immutable
/// after commit; corrections are expressed as new events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    /// Unique event ID (`evt_<uuidv7>`).
    pub id: String,
    /// Parent event ID (`null` only for `session.start`).
    pub parent_id: Option<String>,
    /// Session this event was appended in (the owning session).
    pub session_id: String,
    /// Workspace this event belongs to.
    pub workspace_id: String,
    /// ISO 8601 timestamp, monotonic on the server.
    pub timestamp: String,
    /// Event type discriminator.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Monotonic sequence number within the owning session, starting at 0.
    pub sequence: i64,
    /// Event-specific data (opaque JSON).
    pub payload: Value,
}

impl SessionEvent {
    /// Generate a new event ID.
    #[must_use]
    pub fn generate_id() -> String {
        format!("evt_{}", Uuid::now_v7())
    }
}

/// Typed payload enum for compile-time-safe access.
///
/// Obtained via [`SessionEvent::typed_payload()`]. Each variant wraps the
/// strongly-typed payload struct for its event type. Streaming deltas and
/// unknown types stay opaque.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEventPayload {
    /// `session.start`
    SessionStart(payloads::session::SessionStartPayload),
    /// `session.end`
    SessionEnd(payloads::session::SessionEndPayload),
    /// `session.fork`
    SessionFork(payloads::session::SessionForkPayload),
    /// `message.user`
    MessageUser(payloads::message::UserMessagePayload),
    /// `message.assistant`
    MessageAssistant(payloads::message::AssistantMessagePayload),
    /// `message.deleted`
    MessageDeleted(payloads::message::MessageDeletedPayload),
    /// `tool.call`
    ToolCall(payloads::tool::ToolCallPayload),
    /// `tool.result`
    ToolResult(payloads::tool::ToolResultPayload),
    /// `stream.turn_start`
    StreamTurnStart(payloads::streaming::StreamTurnStartPayload),
    /// `stream.turn_end`
    StreamTurnEnd(payloads::streaming::StreamTurnEndPayload),
    /// `stream.text_delta`
    StreamTextDelta(payloads::streaming::StreamTextDeltaPayload),
    /// `stream.thinking_delta`
    StreamThinkingDelta(payloads::streaming::StreamThinkingDeltaPayload),
    /// `stream.thinking_complete`
    StreamThinkingComplete(payloads::streaming::StreamThinkingCompletePayload),
    /// `config.model_switch`
    ConfigModelSwitch(payloads::config::ConfigModelSwitchPayload),
    /// `config.reasoning_level`
    ConfigReasoningLevel(payloads::config::ConfigReasoningLevelPayload),
    /// `compact.boundary`
    CompactBoundary(payloads::compact::CompactBoundaryPayload),
    /// `compact.summary`
    CompactSummary(payloads::compact::CompactSummaryPayload),
    /// `context.cleared` — carries no fields.
    ContextCleared,
    /// `error.agent`
    ErrorAgent(payloads::error::ErrorAgentPayload),
    /// `error.tool`
    ErrorTool(payloads::error::ErrorToolPayload),
    /// `error.provider`
    ErrorProvider(payloads::error::ErrorProviderPayload),
    /// `turn.failed`
    TurnFailed(payloads::turn::TurnFailedPayload),
    /// `notification.interrupted`
    NotificationInterrupted(payloads::notification::NotificationInterruptedPayload),
    /// `notification.subagent_result`
    NotificationSubagentResult(payloads::notification::NotificationSubagentResultPayload),
    /// Any type this server version does not know — raw JSON preserved.
    Unknown(Value),
}

impl SessionEvent {
    /// Deserialize the payload into the typed variant matching
    /// [`event_type`](Self::event_type).
    ///
    /// Returns `Err` if the payload JSON doesn't match the expected shape.
    pub fn typed_payload(&self) -> std::result::Result<SessionEventPayload, serde_json::Error> {
        let p = self.payload.clone();
        Ok(match &self.event_type {
            EventType::SessionStart => {
                SessionEventPayload::SessionStart(serde_json::from_value(p)?)
            }
            EventType::SessionEnd => SessionEventPayload::SessionEnd(serde_json::from_value(p)?),
            EventType::SessionFork => SessionEventPayload::SessionFork(serde_json::from_value(p)?),
            EventType::MessageUser => SessionEventPayload::MessageUser(serde_json::from_value(p)?),
            EventType::MessageAssistant => {
                SessionEventPayload::MessageAssistant(serde_json::from_value(p)?)
            }
            EventType::MessageDeleted => {
                SessionEventPayload::MessageDeleted(serde_json::from_value(p)?)
            }
            EventType::ToolCall => SessionEventPayload::ToolCall(serde_json::from_value(p)?),
            EventType::ToolResult => SessionEventPayload::ToolResult(serde_json::from_value(p)?),
            EventType::StreamTurnStart => {
                SessionEventPayload::StreamTurnStart(serde_json::from_value(p)?)
            }
            EventType::StreamTurnEnd => {
                SessionEventPayload::StreamTurnEnd(serde_json::from_value(p)?)
            }
            EventType::StreamTextDelta => {
                SessionEventPayload::StreamTextDelta(serde_json::from_value(p)?)
            }
            EventType::StreamThinkingDelta => {
                SessionEventPayload::StreamThinkingDelta(serde_json::from_value(p)?)
            }
            EventType::StreamThinkingComplete => {
                SessionEventPayload::StreamThinkingComplete(serde_json::from_value(p)?)
            }
            EventType::ConfigModelSwitch => {
                SessionEventPayload::ConfigModelSwitch(serde_json::from_value(p)?)
            }
            EventType::ConfigReasoningLevel => {
                SessionEventPayload::ConfigReasoningLevel(serde_json::from_value(p)?)
            }
            EventType::CompactBoundary => {
                SessionEventPayload::CompactBoundary(serde_json::from_value(p)?)
            }
            EventType::CompactSummary => {
                SessionEventPayload::CompactSummary(serde_json::from_value(p)?)
            }
            EventType::ContextCleared => SessionEventPayload::ContextCleared,
            EventType::ErrorAgent => SessionEventPayload::ErrorAgent(serde_json::from_value(p)?),
            EventType::ErrorTool => SessionEventPayload::ErrorTool(serde_json::from_value(p)?),
            EventType::ErrorProvider => {
                SessionEventPayload::ErrorProvider(serde_json::from_value(p)?)
            }
            EventType::TurnFailed => SessionEventPayload::TurnFailed(serde_json::from_value(p)?),
            EventType::NotificationInterrupted => {
                SessionEventPayload::NotificationInterrupted(serde_json::from_value(p)?)
            }
            EventType::NotificationSubagentResult => {
                SessionEventPayload::NotificationSubagentResult(serde_json::from_value(p)?)
            }
            EventType::Unknown(_) => SessionEventPayload::Unknown(p),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
