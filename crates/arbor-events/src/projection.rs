//! State projection — deterministic reconstruction from event ancestry.
//!
//! [`project_state`] folds an ordered ancestor chain (root `session.start`
//! first) into a [`SessionState`] in two passes:
//!
//! 1. **First pass**: collect deleted event IDs and config state (model,
//!    reasoning level, working directory).
//! 2. **Second pass**: build the message list while handling deletions,
//!    compaction collapse, context clears, tool-result interleaving, and
//!    consecutive same-role merging.
//!
//! The fold is pure: given the same event list it returns the same result
//! byte-for-byte. That property is what justifies trusting event replay over
//! the cached session counters.

use serde_json::Value;

use arbor_core::{ReasoningLevel, TokenUsage};

use crate::types::base::SessionEvent;
use crate::types::event_type::EventType;
use crate::types::state::{ProjectedMessage, ProjectedMessageWithIds, SessionState};

/// Prefix of the synthetic user message injected after compaction.
pub const COMPACTION_SUMMARY_PREFIX: &str = "Context from earlier:";
/// Text of the synthetic assistant acknowledgement after compaction.
pub const COMPACTION_ACK_TEXT: &str =
    "Understood. Continuing from the summarized context.";
/// Content of the synthetic error result injected for a `tool_use` block
/// that never received a real result.
pub const INTERRUPTED_TOOL_RESULT_TEXT: &str = "Tool execution was interrupted.";

/// Pass 1 output: config and deletion metadata.
struct Metadata {
    deleted_event_ids: std::collections::HashSet<String>,
    model: String,
    reasoning_level: ReasoningLevel,
    working_directory: String,
}

/// Pending tool result accumulated between assistant messages.
struct PendingToolResult {
    tool_call_id: String,
    content: Value,
    is_error: bool,
}

/// Mutable state carried through the message-building pass.
struct BuildState {
    combined: Vec<ProjectedMessageWithIds>,
    tokens: TokenUsage,
    turn_count: i64,
    pending_tool_results: Vec<PendingToolResult>,
}

/// Project session state from an ordered list of ancestor events.
///
/// `ancestors` must run from the root `session.start` down to the target
/// event, as returned by the store's ancestor walk. Unknown event types are
/// skipped.
#[must_use]
pub fn project_state(ancestors: &[SessionEvent]) -> SessionState {
    let metadata = collect_metadata(ancestors);
    build_state(ancestors, metadata)
}

/// Pass 1: deletion set and config fold.
///
/// Deletions are collected over the whole walk so their effect applies no
/// matter where the `message.deleted` event sits relative to its target.
fn collect_metadata(ancestors: &[SessionEvent]) -> Metadata {
    let mut deleted_event_ids = std::collections::HashSet::new();
    let mut model = String::new();
    let mut reasoning_level = ReasoningLevel::default();
    let mut working_directory = String::new();

    for event in ancestors {
        match &event.event_type {
            EventType::SessionStart => {
                if let Some(m) = event.payload.get("model").and_then(Value::as_str) {
                    model = m.to_owned();
                }
                if let Some(wd) = event
                    .payload
                    .get("workingDirectory")
                    .and_then(Value::as_str)
                {
                    working_directory = wd.to_owned();
                }
            }
            EventType::ConfigModelSwitch => {
                if let Some(m) = event.payload.get("newModel").and_then(Value::as_str) {
                    model = m.to_owned();
                }
            }
            EventType::ConfigReasoningLevel => {
                if let Some(level) = event
                    .payload
                    .get("newLevel")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse().ok())
                {
                    reasoning_level = level;
                }
            }
            EventType::MessageDeleted => {
                if let Some(target) = event.payload.get("targetEventId").and_then(Value::as_str) {
                    let _ = deleted_event_ids.insert(target.to_owned());
                }
            }
            _ => {}
        }
    }

    Metadata {
        deleted_event_ids,
        model,
        reasoning_level,
        working_directory,
    }
}

/// Pass 2: message building.
fn build_state(ancestors: &[SessionEvent], metadata: Metadata) -> SessionState {
    let mut st = BuildState {
        combined: Vec::new(),
        tokens: TokenUsage::default(),
        turn_count: 0,
        pending_tool_results: Vec::new(),
    };

    for event in ancestors {
        if metadata.deleted_event_ids.contains(&event.id) {
            continue;
        }
        match &event.event_type {
            EventType::MessageUser => handle_message_user(event, &mut st),
            EventType::MessageAssistant => handle_message_assistant(event, &mut st),
            EventType::ToolResult => handle_tool_result(event, &mut st),
            EventType::CompactSummary => handle_compact_summary(event, &mut st),
            EventType::ContextCleared => {
                st.combined.clear();
                st.pending_tool_results.clear();
            }
            _ => {}
        }
    }

    // End-of-stream flush: tool results that arrived after the final
    // assistant message still belong in the list (mid-turn resume).
    if !st.pending_tool_results.is_empty()
        && st
            .combined
            .last()
            .is_some_and(|m| m.message.role == "assistant")
    {
        flush_tool_results(&mut st.combined, &mut st.pending_tool_results);
    }

    // Inject synthetic error results for any unmatched tool calls.
    // This happens when: (a) a user interrupt discards pending tool results,
    // or (b) the session ended mid-tool-execution before results arrived.
    // Without this, providers like OpenAI reject the history because every
    // function_call must have a corresponding function_call_output.
    inject_missing_tool_results(&mut st.combined);

    SessionState {
        messages: st.combined,
        token_usage: st.tokens,
        model: metadata.model,
        reasoning_level: metadata.reasoning_level,
        working_directory: metadata.working_directory,
        turn_count: st.turn_count,
    }
}

/// `message.user`: discard pending tool results, merge consecutive users.
fn handle_message_user(event: &SessionEvent, st: &mut BuildState) {
    st.pending_tool_results.clear();

    let content = event.payload.get("content").cloned().unwrap_or(Value::Null);

    if st.combined.last().is_some_and(|m| m.message.role == "user") {
        let last = st.combined.last_mut().expect("non-empty checked above");
        last.message.content = merge_content(&last.message.content, &content, true);
        last.event_ids.push(Some(event.id.clone()));
    } else {
        st.combined.push(ProjectedMessageWithIds {
            message: ProjectedMessage {
                role: "user".into(),
                content,
                tool_call_id: None,
                is_error: None,
            },
            event_ids: vec![Some(event.id.clone())],
        });
    }
    track_turn(event, st);
}

/// `message.assistant`: flush tool results, merge consecutive assistants,
/// accumulate token usage.
fn handle_message_assistant(event: &SessionEvent, st: &mut BuildState) {
    let content = event.payload.get("content").cloned().unwrap_or(Value::Null);
    let has_tool_use = content_has_tool_use(&content);

    // Results from the previous assistant round land before this message.
    if st
        .combined
        .last()
        .is_some_and(|m| m.message.role == "assistant")
        && !st.pending_tool_results.is_empty()
    {
        flush_tool_results(&mut st.combined, &mut st.pending_tool_results);
    }

    if st
        .combined
        .last()
        .is_some_and(|m| m.message.role == "assistant")
    {
        let last = st.combined.last_mut().expect("non-empty checked above");
        last.message.content = merge_content(&last.message.content, &content, false);
        last.event_ids.push(Some(event.id.clone()));
    } else {
        st.combined.push(ProjectedMessageWithIds {
            message: ProjectedMessage {
                role: "assistant".into(),
                content,
                tool_call_id: None,
                is_error: None,
            },
            event_ids: vec![Some(event.id.clone())],
        });
    }

    if has_tool_use && !st.pending_tool_results.is_empty() {
        flush_tool_results(&mut st.combined, &mut st.pending_tool_results);
    }

    accumulate_tokens(&event.payload, &mut st.tokens);
    track_turn(event, st);
}

/// `tool.result`: accumulate for flushing after its assistant message.
fn handle_tool_result(event: &SessionEvent, st: &mut BuildState) {
    st.pending_tool_results.push(PendingToolResult {
        tool_call_id: event
            .payload
            .get("toolCallId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        content: event.payload.get("content").cloned().unwrap_or(Value::Null),
        is_error: event
            .payload
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    });
}

/// `compact.summary`: collapse everything before it into a synthetic pair.
fn handle_compact_summary(event: &SessionEvent, st: &mut BuildState) {
    let summary = event
        .payload
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or_default();

    st.combined.clear();
    st.pending_tool_results.clear();

    st.combined.push(ProjectedMessageWithIds {
        message: ProjectedMessage {
            role: "user".into(),
            content: Value::String(format!("{COMPACTION_SUMMARY_PREFIX}\n\n{summary}")),
            tool_call_id: None,
            is_error: None,
        },
        event_ids: vec![None],
    });
    st.combined.push(ProjectedMessageWithIds {
        message: ProjectedMessage {
            role: "assistant".into(),
            content: serde_json::json!([{ "type": "text", "text": COMPACTION_ACK_TEXT }]),
            tool_call_id: None,
            is_error: None,
        },
        event_ids: vec![None],
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Inject synthetic error `toolResult` messages for any assistant
/// `tool_use` blocks that lack a corresponding result in the following
/// messages.
///
/// Scans the built message list and, for each assistant message containing
/// `tool_use` blocks, checks whether matching `toolResult` messages follow
/// before the next non-result message. Any unmatched tool calls get a
/// synthetic error result inserted immediately after the assistant message.
fn inject_missing_tool_results(combined: &mut Vec<ProjectedMessageWithIds>) {
    let mut insertions: Vec<(usize, Vec<ProjectedMessageWithIds>)> = Vec::new();

    for (i, entry) in combined.iter().enumerate() {
        if entry.message.role != "assistant" {
            continue;
        }
        let tool_use_ids = extract_tool_use_ids(&entry.message.content);
        if tool_use_ids.is_empty() {
            continue;
        }

        // Collect the ids answered by the run of toolResult messages that
        // immediately follows.
        let mut matched_ids = std::collections::HashSet::new();
        let mut j = i + 1;
        while j < combined.len() && combined[j].message.role == "toolResult" {
            if let Some(tc_id) = &combined[j].message.tool_call_id {
                let _ = matched_ids.insert(tc_id.clone());
            }
            j += 1;
        }

        let synthetic: Vec<ProjectedMessageWithIds> = tool_use_ids
            .into_iter()
            .filter(|id| !matched_ids.contains(id))
            .map(|tool_call_id| ProjectedMessageWithIds {
                message: ProjectedMessage {
                    role: "toolResult".into(),
                    content: Value::String(INTERRUPTED_TOOL_RESULT_TEXT.into()),
                    tool_call_id: Some(tool_call_id),
                    is_error: Some(true),
                },
                event_ids: vec![None],
            })
            .collect();

        if !synthetic.is_empty() {
            insertions.push((i + 1, synthetic));
        }
    }

    // Apply insertions in reverse order to preserve indices.
    for (idx, msgs) in insertions.into_iter().rev() {
        let _ = combined.splice(idx..idx, msgs);
    }
}

/// Extract all `tool_use` block IDs from a message's content.
fn extract_tool_use_ids(content: &Value) -> Vec<String> {
    match content {
        Value::Array(arr) => arr
            .iter()
            .filter(|block| block.get("type").and_then(Value::as_str) == Some("tool_use"))
            .filter_map(|block| block.get("id").and_then(Value::as_str).map(String::from))
            .collect(),
        _ => vec![],
    }
}

/// Flush pending tool results as `toolResult` messages; they never merge
/// with each other.
fn flush_tool_results(
    combined: &mut Vec<ProjectedMessageWithIds>,
    pending: &mut Vec<PendingToolResult>,
) {
    for tr in pending.drain(..) {
        combined.push(ProjectedMessageWithIds {
            message: ProjectedMessage {
                role: "toolResult".into(),
                content: tr.content,
                tool_call_id: Some(tr.tool_call_id),
                is_error: Some(tr.is_error),
            },
            event_ids: vec![None],
        });
    }
}

/// Merge content from two same-role messages.
///
/// User content may be a plain string; it is normalised to a single text
/// block first. Assistant content is always a block array; the arrays are
/// concatenated.
fn merge_content(existing: &Value, incoming: &Value, normalize_strings: bool) -> Value {
    let to_blocks = |v: &Value| -> Vec<Value> {
        match v {
            Value::String(s) if normalize_strings => {
                vec![serde_json::json!({"type": "text", "text": s})]
            }
            Value::Array(arr) => arr.clone(),
            _ => vec![],
        }
    };
    let mut merged = to_blocks(existing);
    merged.extend(to_blocks(incoming));
    Value::Array(merged)
}

/// Check if content contains any `tool_use` blocks.
fn content_has_tool_use(content: &Value) -> bool {
    match content {
        Value::Array(arr) => arr
            .iter()
            .any(|block| block.get("type").and_then(Value::as_str) == Some("tool_use")),
        _ => false,
    }
}

/// Accumulate token usage from a payload's `tokenUsage` field.
fn accumulate_tokens(payload: &Value, tokens: &mut TokenUsage) {
    let Some(tu) = payload.get("tokenUsage") else {
        return;
    };
    let get = |key: &str| tu.get(key).and_then(Value::as_u64);
    tokens.input_tokens += get("inputTokens").unwrap_or(0);
    tokens.output_tokens += get("outputTokens").unwrap_or(0);
    if let Some(cr) = get("cacheReadTokens") {
        tokens.cache_read_tokens = Some(tokens.cache_read_tokens.unwrap_or(0) + cr);
    }
    if let Some(cc) = get("cacheCreationTokens") {
        tokens.cache_creation_tokens = Some(tokens.cache_creation_tokens.unwrap_or(0) + cc);
    }
}

/// Track the highest turn number seen.
fn track_turn(event: &SessionEvent, st: &mut BuildState) {
    if let Some(turn) = event.payload.get("turn").and_then(Value::as_i64) {
        if turn > st.turn_count {
            st.turn_count = turn;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
