//! The [`EventType`] enum — session event type discriminators.
//!
//! Every known variant maps to an exact dot-separated wire string
//! (e.g. `"session.start"`). The set is closed for the server, but clients
//! must tolerate types they do not know: unknown strings deserialize into
//! [`EventType::Unknown`], which preserves the raw string and is skipped
//! during projection.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// All session event types.
///
/// Each known variant serializes to the exact dot-separated string the wire
/// protocol expects. [`EventType::Unknown`] round-trips any other string
/// losslessly.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    // -- Session lifecycle --
    /// New session started.
    SessionStart,
    /// Session ended.
    SessionEnd,
    /// Session forked from another.
    SessionFork,

    // -- Messages --
    /// User message.
    MessageUser,
    /// Assistant (model) message.
    MessageAssistant,
    /// Message deleted (soft delete).
    MessageDeleted,

    // -- Tools --
    /// Tool call from the model.
    ToolCall,
    /// Tool execution result.
    ToolResult,

    // -- Streaming --
    /// Text delta during streaming.
    StreamTextDelta,
    /// Thinking delta during streaming.
    StreamThinkingDelta,
    /// Thinking block finished streaming.
    StreamThinkingComplete,
    /// Turn started streaming.
    StreamTurnStart,
    /// Turn finished streaming.
    StreamTurnEnd,

    // -- Config --
    /// Model switched.
    ConfigModelSwitch,
    /// Reasoning level changed.
    ConfigReasoningLevel,

    // -- Compaction --
    /// Compaction boundary marker.
    CompactBoundary,
    /// Compaction summary.
    CompactSummary,

    // -- Context --
    /// Context cleared.
    ContextCleared,

    // -- Errors --
    /// Agent-level error.
    ErrorAgent,
    /// Tool execution error.
    ErrorTool,
    /// Provider (LLM) error.
    ErrorProvider,

    // -- Turn --
    /// Turn failed.
    TurnFailed,

    // -- Notifications --
    /// Agent interrupted by user.
    NotificationInterrupted,
    /// Subagent result notification.
    NotificationSubagentResult,

    /// Any event type this server version does not know.
    ///
    /// The raw string is preserved so the event round-trips unchanged.
    Unknown(String),
}

/// All known event type variants in definition order.
///
/// Useful for iteration in tests and manifest generation.
pub const ALL_EVENT_TYPES: [EventType; 24] = [
    EventType::SessionStart,
    EventType::SessionEnd,
    EventType::SessionFork,
    EventType::MessageUser,
    EventType::MessageAssistant,
    EventType::MessageDeleted,
    EventType::ToolCall,
    EventType::ToolResult,
    EventType::StreamTextDelta,
    EventType::StreamThinkingDelta,
    EventType::StreamThinkingComplete,
    EventType::StreamTurnStart,
    EventType::StreamTurnEnd,
    EventType::ConfigModelSwitch,
    EventType::ConfigReasoningLevel,
    EventType::CompactBoundary,
    EventType::CompactSummary,
    EventType::ContextCleared,
    EventType::ErrorAgent,
    EventType::ErrorTool,
    EventType::ErrorProvider,
    EventType::TurnFailed,
    EventType::NotificationInterrupted,
    EventType::NotificationSubagentResult,
];

impl EventType {
    /// Return the canonical string representation (e.g., `"session.start"`).
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::SessionStart => "session.start",
            Self::SessionEnd => "session.end",
            Self::SessionFork => "session.fork",
            Self::MessageUser => "message.user",
            Self::MessageAssistant => "message.assistant",
            Self::MessageDeleted => "message.deleted",
            Self::ToolCall => "tool.call",
            Self::ToolResult => "tool.result",
            Self::StreamTextDelta => "stream.text_delta",
            Self::StreamThinkingDelta => "stream.thinking_delta",
            Self::StreamThinkingComplete => "stream.thinking_complete",
            Self::StreamTurnStart => "stream.turn_start",
            Self::StreamTurnEnd => "stream.turn_end",
            Self::ConfigModelSwitch => "config.model_switch",
            Self::ConfigReasoningLevel => "config.reasoning_level",
            Self::CompactBoundary => "compact.boundary",
            Self::CompactSummary => "compact.summary",
            Self::ContextCleared => "context.cleared",
            Self::ErrorAgent => "error.agent",
            Self::ErrorTool => "error.tool",
            Self::ErrorProvider => "error.provider",
            Self::TurnFailed => "turn.failed",
            Self::NotificationInterrupted => "notification.interrupted",
            Self::NotificationSubagentResult => "notification.subagent_result",
            Self::Unknown(s) => s,
        }
    }

    /// Whether this is a message event (`message.user` / `message.assistant`).
    #[must_use]
    pub fn is_message_type(&self) -> bool {
        matches!(self, Self::MessageUser | Self::MessageAssistant)
    }

    /// Whether a `message.deleted` event may target this type.
    #[must_use]
    pub fn is_deletable(&self) -> bool {
        matches!(
            self,
            Self::MessageUser | Self::MessageAssistant | Self::ToolResult
        )
    }

    /// Whether this is a streaming event (`stream.*`).
    #[must_use]
    pub fn is_streaming_type(&self) -> bool {
        matches!(
            self,
            Self::StreamTextDelta
                | Self::StreamThinkingDelta
                | Self::StreamThinkingComplete
                | Self::StreamTurnStart
                | Self::StreamTurnEnd
        )
    }

    /// Whether this is an error event (`error.*`).
    #[must_use]
    pub fn is_error_type(&self) -> bool {
        matches!(self, Self::ErrorAgent | Self::ErrorTool | Self::ErrorProvider)
    }

    /// Whether this is a config event (`config.*`).
    #[must_use]
    pub fn is_config_type(&self) -> bool {
        matches!(self, Self::ConfigModelSwitch | Self::ConfigReasoningLevel)
    }

    /// Whether this is a session lifecycle event (`session.*`).
    #[must_use]
    pub fn is_session_type(&self) -> bool {
        matches!(
            self,
            Self::SessionStart | Self::SessionEnd | Self::SessionFork
        )
    }

    /// Whether projection skips this type (unknown types are opaque).
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }

    /// The domain prefix (e.g., `"session"`, `"message"`, `"tool"`).
    #[must_use]
    pub fn domain(&self) -> &str {
        let s = self.as_str();
        s.split('.').next().unwrap_or(s)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "session.start" => Self::SessionStart,
            "session.end" => Self::SessionEnd,
            "session.fork" => Self::SessionFork,
            "message.user" => Self::MessageUser,
            "message.assistant" => Self::MessageAssistant,
            "message.deleted" => Self::MessageDeleted,
            "tool.call" => Self::ToolCall,
            "tool.result" => Self::ToolResult,
            "stream.text_delta" => Self::StreamTextDelta,
            "stream.thinking_delta" => Self::StreamThinkingDelta,
            "stream.thinking_complete" => Self::StreamThinkingComplete,
            "stream.turn_start" => Self::StreamTurnStart,
            "stream.turn_end" => Self::StreamTurnEnd,
            "config.model_switch" => Self::ConfigModelSwitch,
            "config.reasoning_level" => Self::ConfigReasoningLevel,
            "compact.boundary" => Self::CompactBoundary,
            "compact.summary" => Self::CompactSummary,
            "context.cleared" => Self::ContextCleared,
            "error.agent" => Self::ErrorAgent,
            "error.tool" => Self::ErrorTool,
            "error.provider" => Self::ErrorProvider,
            "turn.failed" => Self::TurnFailed,
            "notification.interrupted" => Self::NotificationInterrupted,
            "notification.subagent_result" => Self::NotificationSubagentResult,
            other => Self::Unknown(other.to_owned()),
        })
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TypeVisitor;

        impl Visitor<'_> for TypeVisitor {
            type Value = EventType;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an event type string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<EventType, E> {
                Ok(v.parse().unwrap_or(EventType::Unknown(v.to_owned())))
            }
        }

        deserializer.deserialize_str(TypeVisitor)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_known_types_roundtrip_through_strings() {
        for t in ALL_EVENT_TYPES {
            let parsed: EventType = t.as_str().parse().unwrap();
            assert_eq!(parsed, t);
        }
    }

    #[test]
    fn all_known_types_roundtrip_through_serde() {
        for t in ALL_EVENT_TYPES {
            let json = serde_json::to_value(&t).unwrap();
            assert_eq!(json, t.as_str());
            let back: EventType = serde_json::from_value(json).unwrap();
            assert_eq!(back, t);
        }
    }

    #[test]
    fn unknown_type_preserves_raw_string() {
        let t: EventType = serde_json::from_value(serde_json::json!("widget.rotated")).unwrap();
        assert_eq!(t, EventType::Unknown("widget.rotated".into()));
        assert_eq!(serde_json::to_value(&t).unwrap(), "widget.rotated");
        assert!(t.is_unknown());
    }

    #[test]
    fn wire_strings_are_stable() {
        assert_eq!(EventType::SessionStart.as_str(), "session.start");
        assert_eq!(EventType::MessageAssistant.as_str(), "message.assistant");
        assert_eq!(EventType::StreamThinkingComplete.as_str(), "stream.thinking_complete");
        assert_eq!(EventType::ConfigModelSwitch.as_str(), "config.model_switch");
        assert_eq!(EventType::TurnFailed.as_str(), "turn.failed");
        assert_eq!(
            EventType::NotificationSubagentResult.as_str(),
            "notification.subagent_result"
        );
    }

    #[test]
    fn deletable_types() {
        assert!(EventType::MessageUser.is_deletable());
        assert!(EventType::MessageAssistant.is_deletable());
        assert!(EventType::ToolResult.is_deletable());
        assert!(!EventType::SessionStart.is_deletable());
        assert!(!EventType::ToolCall.is_deletable());
    }

    #[test]
    fn type_families() {
        assert!(EventType::StreamTextDelta.is_streaming_type());
        assert!(EventType::ErrorProvider.is_error_type());
        assert!(EventType::ConfigReasoningLevel.is_config_type());
        assert!(EventType::SessionFork.is_session_type());
        assert!(EventType::MessageUser.is_message_type());
        assert!(!EventType::MessageDeleted.is_message_type());
    }

    #[test]
    fn domain_prefix() {
        assert_eq!(EventType::SessionStart.domain(), "session");
        assert_eq!(EventType::StreamTextDelta.domain(), "stream");
        assert_eq!(EventType::Unknown("custom.thing".into()).domain(), "custom");
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(format!("{}", EventType::ToolCall), "tool.call");
    }
}
