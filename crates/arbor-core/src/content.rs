//! Content block types.
//!
//! These are the primitive building blocks that appear inside messages.
//! Kept separate from the message types so that both the projection layer
//! and the provider adapters can reference them without cycles.

use serde::{Deserialize, Serialize};

/// Content that can appear in user messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UserContent {
    /// Text content.
    #[serde(rename = "text")]
    Text {
        /// The text.
        text: String,
    },
    /// Image content.
    #[serde(rename = "image")]
    Image {
        /// Base64-encoded image data.
        data: String,
        /// MIME type.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

/// Content that can appear in assistant messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AssistantContent {
    /// Text content.
    #[serde(rename = "text")]
    Text {
        /// The text.
        text: String,
    },
    /// Thinking content (extended reasoning).
    #[serde(rename = "thinking")]
    Thinking {
        /// The thinking text.
        thinking: String,
        /// Verification signature.
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// Tool use content.
    #[serde(rename = "tool_use")]
    ToolUse {
        /// Tool call ID.
        id: String,
        /// Tool name.
        name: String,
        /// Tool arguments.
        arguments: serde_json::Map<String, serde_json::Value>,
    },
}

/// Content that can appear in tool result messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolResultContent {
    /// Text content.
    #[serde(rename = "text")]
    Text {
        /// The text.
        text: String,
    },
    /// Image content.
    #[serde(rename = "image")]
    Image {
        /// Base64-encoded image data.
        data: String,
        /// MIME type.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl UserContent {
    /// Create a text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

impl AssistantContent {
    /// Create a text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

impl ToolResultContent {
    /// Create a text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_text_serializes_tagged() {
        let block = UserContent::text("hello");
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["text"], "hello");
    }

    #[test]
    fn assistant_tool_use_roundtrip() {
        let mut args = serde_json::Map::new();
        let _ = args.insert("path".into(), serde_json::Value::String("/tmp".into()));
        let block = AssistantContent::ToolUse {
            id: "call_1".into(),
            name: "read".into(),
            arguments: args,
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "tool_use");
        assert_eq!(json["name"], "read");
        let back: AssistantContent = serde_json::from_value(json).unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn thinking_signature_omitted_when_none() {
        let block = AssistantContent::Thinking {
            thinking: "hmm".into(),
            signature: None,
        };
        let json = serde_json::to_value(&block).unwrap();
        assert!(json.get("signature").is_none());
    }

    #[test]
    fn tool_result_image_roundtrip() {
        let block = ToolResultContent::Image {
            data: "aGk=".into(),
            mime_type: "image/png".into(),
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["mimeType"], "image/png");
        let back: ToolResultContent = serde_json::from_value(json).unwrap();
        assert_eq!(back, block);
    }
}
