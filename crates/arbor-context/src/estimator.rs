//! Token estimation utilities.
//!
//! Pure functions for estimating token counts from text and messages.
//!
//! ## Formula
//!
//! `tokens = ceil(characters / 4)` plus a small per-message overhead for the
//! role and structure. This is the server's canonical estimator: it is
//! deterministic, it is the same function for every language and script
//! (non-English content is estimated by the same coarse character count),
//! and tests rely on being able to predict it exactly.

use arbor_core::{
    AssistantContent, Message, ToolResultContent, ToolResultMessageContent, UserContent,
    UserMessageContent,
};

/// Characters per token in the approximation.
pub const CHARS_PER_TOKEN: u64 = 4;

/// Fixed per-message character overhead (role tag and structure).
const MESSAGE_OVERHEAD_CHARS: usize = 10;

/// Shorthand for chars → tokens conversion.
fn chars_to_tokens(chars: usize) -> u64 {
    (chars as u64).div_ceil(CHARS_PER_TOKEN)
}

/// Estimate tokens for a plain text string.
#[must_use]
pub fn estimate_text_tokens(text: &str) -> u64 {
    chars_to_tokens(text.len())
}

fn user_content_chars(content: &UserContent) -> usize {
    match content {
        UserContent::Text { text } => text.len(),
        UserContent::Image { data, .. } => data.len(),
    }
}

fn assistant_content_chars(content: &AssistantContent) -> usize {
    match content {
        AssistantContent::Text { text } => text.len(),
        AssistantContent::Thinking { thinking, .. } => thinking.len(),
        AssistantContent::ToolUse {
            id,
            name,
            arguments,
        } => {
            let args_len = serde_json::to_string(arguments).map_or(0, |s| s.len());
            id.len() + name.len() + args_len
        }
    }
}

fn tool_result_content_chars(content: &ToolResultContent) -> usize {
    match content {
        ToolResultContent::Text { text } => text.len(),
        ToolResultContent::Image { data, .. } => data.len(),
    }
}

/// Estimate tokens for a single message, including role overhead.
#[must_use]
pub fn estimate_message_tokens(message: &Message) -> u64 {
    let mut chars = message.role().len() + MESSAGE_OVERHEAD_CHARS;

    match message {
        Message::User { content } => match content {
            UserMessageContent::Text(text) => chars += text.len(),
            UserMessageContent::Blocks(blocks) => {
                chars += blocks.iter().map(user_content_chars).sum::<usize>();
            }
        },
        Message::Assistant { content, .. } => {
            chars += content.iter().map(assistant_content_chars).sum::<usize>();
        }
        Message::ToolResult {
            tool_call_id,
            content,
            ..
        } => {
            chars += tool_call_id.len();
            match content {
                ToolResultMessageContent::Text(text) => chars += text.len(),
                ToolResultMessageContent::Blocks(blocks) => {
                    chars += blocks.iter().map(tool_result_content_chars).sum::<usize>();
                }
            }
        }
    }

    chars_to_tokens(chars)
}

/// Estimate tokens for a list of messages.
#[must_use]
pub fn estimate_messages_tokens(messages: &[Message]) -> u64 {
    messages.iter().map(estimate_message_tokens).sum()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_tokens_rounds_up() {
        assert_eq!(estimate_text_tokens(""), 0);
        assert_eq!(estimate_text_tokens("abc"), 1);
        assert_eq!(estimate_text_tokens("abcd"), 1);
        assert_eq!(estimate_text_tokens("abcde"), 2);
    }

    #[test]
    fn user_message_tokens() {
        // "user"(4) + 10 + "Hello, how are you?"(19) = 33 → ceil(33/4) = 9
        assert_eq!(estimate_message_tokens(&Message::user("Hello, how are you?")), 9);
    }

    #[test]
    fn assistant_message_tokens() {
        // "assistant"(9) + 10 + "Hi there!"(9) = 28 → 7
        assert_eq!(estimate_message_tokens(&Message::assistant("Hi there!")), 7);
    }

    #[test]
    fn tool_result_message_tokens() {
        let msg = Message::ToolResult {
            tool_call_id: "call_1".into(),
            content: ToolResultMessageContent::Text("result data".into()),
            is_error: None,
        };
        // "toolResult"(10) + 10 + "call_1"(6) + "result data"(11) = 37 → 10
        assert_eq!(estimate_message_tokens(&msg), 10);
    }

    #[test]
    fn tool_use_block_counts_arguments() {
        let mut args = serde_json::Map::new();
        let _ = args.insert("cmd".into(), serde_json::Value::String("ls".into()));
        let msg = Message::Assistant {
            content: vec![AssistantContent::ToolUse {
                id: "call_1".into(),
                name: "bash".into(),
                arguments: args,
            }],
            usage: None,
            stop_reason: None,
        };
        // "assistant"(9) + 10 + "call_1"(6) + "bash"(4) + {"cmd":"ls"}(12) = 41 → 11
        assert_eq!(estimate_message_tokens(&msg), 11);
    }

    #[test]
    fn empty_message_still_has_overhead() {
        // "user"(4) + 10 = 14 → 4
        assert_eq!(estimate_message_tokens(&Message::user("")), 4);
    }

    #[test]
    fn messages_sum_equals_individual_sum() {
        let messages = vec![Message::user("Hello"), Message::assistant("Hi!")];
        let total = estimate_messages_tokens(&messages);
        let sum: u64 = messages.iter().map(estimate_message_tokens).sum();
        assert_eq!(total, sum);
    }

    #[test]
    fn estimator_is_symmetric_for_identical_content() {
        let a = Message::user("same content");
        let b = Message::user("same content");
        assert_eq!(estimate_message_tokens(&a), estimate_message_tokens(&b));
    }

    #[test]
    fn longer_content_means_more_tokens() {
        let short = Message::user("hi");
        let long = Message::user(&"a".repeat(1_000));
        assert!(estimate_message_tokens(&long) > estimate_message_tokens(&short));
    }

    #[test]
    fn large_text_token_count_matches_chars_over_four() {
        // 1.2M chars ≈ 300k tokens, the ratio the threshold scenarios rely on.
        let text = "a".repeat(1_200_000);
        assert_eq!(estimate_text_tokens(&text), 300_000);
    }
}
