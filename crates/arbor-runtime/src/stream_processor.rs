//! Stream processor — consumes a provider stream, persisting and
//! broadcasting deltas as they arrive and accumulating the final message.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use arbor_core::{AssistantContent, StopReason, TokenUsage, ToolCall};
use arbor_events::EventType;
use arbor_llm::provider::{ProviderEvent, ProviderEventStream};

use crate::bus::{BusEvent, NotificationBus};
use crate::persister::EventPersister;

/// What one provider round produced.
#[derive(Clone, Debug, Default)]
pub struct StreamOutcome {
    /// Final content blocks (from the provider's `Done` message).
    pub content: Vec<AssistantContent>,
    /// Tool calls emitted during the round.
    pub tool_calls: Vec<ToolCall>,
    /// Normalised usage from the `Done` message.
    pub usage: Option<TokenUsage>,
    /// Stop reason, when the round completed.
    pub stop_reason: Option<StopReason>,
    /// Model that produced the message.
    pub model: Option<String>,
    /// Whether the round was cancelled mid-stream.
    pub interrupted: bool,
    /// Text accumulated before an interrupt.
    pub partial_text: Option<String>,
}

/// A provider failure carrying everything the `error.provider` and
/// `turn.failed` events need.
#[derive(Clone, Debug)]
pub struct ProviderFault {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Whether the caller may retry the turn.
    pub recoverable: bool,
}

impl ProviderFault {
    /// Build a fault from a wire code, classifying retryability.
    ///
    /// Transient conditions (rate limits, network, server errors, timeouts)
    /// are recoverable; auth, quota, and unknown-model failures are not.
    #[must_use]
    pub fn from_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let recoverable = matches!(
            code.as_str(),
            "rate_limit" | "network" | "timeout" | "overloaded" | "server_error" | "incomplete_stream"
        );
        Self {
            code,
            message: message.into(),
            recoverable,
        }
    }
}

/// Drive a provider stream to completion.
///
/// Every `text_delta` / `thinking_delta` is persisted fire-and-forget as its
/// streaming event and broadcast once committed; `toolcall_end` persists a
/// `tool.call` event. Cancellation wins over pending stream items and yields
/// an interrupted outcome instead of an error — already-enqueued persister
/// writes are left to commit.
pub async fn process_stream(
    mut stream: ProviderEventStream,
    turn: i64,
    session_id: &str,
    persister: &Arc<EventPersister>,
    bus: &Arc<NotificationBus>,
    cancel: &CancellationToken,
) -> Result<StreamOutcome, ProviderFault> {
    let mut text_acc = String::with_capacity(4096);
    let mut tool_calls: Vec<ToolCall> = Vec::with_capacity(4);

    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Ok(StreamOutcome {
                    tool_calls,
                    interrupted: true,
                    partial_text: if text_acc.is_empty() { None } else { Some(text_acc) },
                    ..Default::default()
                });
            }
            event = stream.next() => event,
        };

        match event {
            None => {
                return Err(ProviderFault::from_code(
                    "incomplete_stream",
                    "provider stream ended without a done event",
                ));
            }
            Some(Err(e)) => {
                return Err(ProviderFault {
                    code: e.code().to_owned(),
                    message: e.to_string(),
                    recoverable: e.is_retryable(),
                });
            }
            Some(Ok(provider_event)) => match provider_event {
                ProviderEvent::Start => {}

                ProviderEvent::TextDelta { delta } => {
                    text_acc.push_str(&delta);
                    persist_and_publish(
                        persister,
                        bus,
                        EventType::StreamTextDelta,
                        json!({"delta": delta, "turn": turn}),
                    );
                }

                ProviderEvent::ThinkingDelta { delta } => {
                    persist_and_publish(
                        persister,
                        bus,
                        EventType::StreamThinkingDelta,
                        json!({"delta": delta, "turn": turn}),
                    );
                }

                ProviderEvent::ToolCallStart { tool_call_id, name } => {
                    // Transient visibility only; the persisted record is the
                    // tool.call event written at toolcall_end.
                    bus.publish(&BusEvent {
                        event_type: "stream.toolcall_start".into(),
                        session_id: session_id.to_owned(),
                        sequence: None,
                        payload: json!({"toolCallId": tool_call_id, "name": name, "turn": turn}),
                    });
                }

                ProviderEvent::ToolCallEnd { tool_call } => {
                    persist_and_publish(
                        persister,
                        bus,
                        EventType::ToolCall,
                        json!({
                            "toolCallId": tool_call.id,
                            "name": tool_call.name,
                            "arguments": tool_call.arguments,
                            "turn": turn,
                        }),
                    );
                    tool_calls.push(tool_call);
                }

                ProviderEvent::Done { message } => {
                    return Ok(StreamOutcome {
                        content: message.content,
                        tool_calls,
                        usage: Some(message.usage),
                        stop_reason: Some(message.stop_reason),
                        model: Some(message.model),
                        interrupted: false,
                        partial_text: None,
                    });
                }

                ProviderEvent::Error { code, message } => {
                    return Err(ProviderFault::from_code(code, message));
                }
            },
        }
    }
}

/// Fire-and-forget persist; broadcast once the row has committed so the
/// published sequence is real.
fn persist_and_publish(
    persister: &Arc<EventPersister>,
    bus: &Arc<NotificationBus>,
    event_type: EventType,
    payload: serde_json::Value,
) {
    let bus = bus.clone();
    persister.append_with(event_type, payload, move |row| {
        bus.publish(&BusEvent {
            event_type: row.event_type.clone(),
            session_id: row.session_id.clone(),
            sequence: Some(row.sequence),
            payload: serde_json::from_str(&row.payload).unwrap_or(serde_json::Value::Null),
        });
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_events::sqlite::repositories::event::ListEventsOptions;
    use arbor_events::{ConnectionConfig, EventStore, new_in_memory, run_migrations};
    use arbor_llm::provider::{CompletedMessage, ProviderError};

    fn make_store() -> Arc<EventStore> {
        let pool = new_in_memory(&ConnectionConfig {
            pool_size: 1,
            ..Default::default()
        })
        .unwrap();
        {
            let conn = pool.get().unwrap();
            let _ = run_migrations(&conn).unwrap();
        }
        Arc::new(EventStore::new(pool))
    }

    fn fixture() -> (Arc<EventStore>, String, Arc<EventPersister>, Arc<NotificationBus>) {
        let store = make_store();
        let sid = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap()
            .session
            .id;
        let persister = Arc::new(EventPersister::new(store.clone(), &sid).unwrap());
        let bus = Arc::new(NotificationBus::new());
        (store, sid, persister, bus)
    }

    fn scripted(events: Vec<Result<ProviderEvent, ProviderError>>) -> ProviderEventStream {
        Box::pin(futures::stream::iter(events))
    }

    fn done_message(text: &str, stop: StopReason) -> ProviderEvent {
        ProviderEvent::Done {
            message: CompletedMessage {
                content: vec![AssistantContent::text(text)],
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 5,
                    ..Default::default()
                },
                stop_reason: stop,
                model: "claude-sonnet-4-5".into(),
            },
        }
    }

    #[tokio::test]
    async fn accumulates_until_done() {
        let (store, sid, persister, bus) = fixture();
        let stream = scripted(vec![
            Ok(ProviderEvent::Start),
            Ok(ProviderEvent::TextDelta { delta: "Hel".into() }),
            Ok(ProviderEvent::TextDelta { delta: "lo".into() }),
            Ok(done_message("Hello", StopReason::EndTurn)),
        ]);

        let cancel = CancellationToken::new();
        let outcome = process_stream(stream, 1, &sid, &persister, &bus, &cancel)
            .await
            .unwrap();

        assert_eq!(outcome.stop_reason, Some(StopReason::EndTurn));
        assert_eq!(outcome.content, vec![AssistantContent::text("Hello")]);
        assert!(!outcome.interrupted);

        persister.flush().await;
        let events = store
            .get_events_by_session(&sid, ListEventsOptions::default())
            .unwrap();
        let delta_count = events
            .iter()
            .filter(|e| e.event_type == "stream.text_delta")
            .count();
        assert_eq!(delta_count, 2);
    }

    #[tokio::test]
    async fn tool_call_end_persists_tool_call_event() {
        let (store, sid, persister, bus) = fixture();
        let mut args = serde_json::Map::new();
        let _ = args.insert("command".into(), serde_json::Value::String("ls".into()));
        let stream = scripted(vec![
            Ok(ProviderEvent::ToolCallStart {
                tool_call_id: "call_1".into(),
                name: "bash".into(),
            }),
            Ok(ProviderEvent::ToolCallEnd {
                tool_call: ToolCall {
                    id: "call_1".into(),
                    name: "bash".into(),
                    arguments: args,
                },
            }),
            Ok(done_message("running", StopReason::ToolUse)),
        ]);

        let cancel = CancellationToken::new();
        let outcome = process_stream(stream, 1, &sid, &persister, &bus, &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.tool_calls.len(), 1);
        assert_eq!(outcome.stop_reason, Some(StopReason::ToolUse));

        persister.flush().await;
        let events = store
            .get_events_by_session(&sid, ListEventsOptions::default())
            .unwrap();
        assert!(events.iter().any(|e| e.event_type == "tool.call"));
    }

    #[tokio::test]
    async fn provider_error_event_becomes_fault() {
        let (_store, sid, persister, bus) = fixture();
        let stream = scripted(vec![
            Ok(ProviderEvent::TextDelta { delta: "Hi".into() }),
            Ok(ProviderEvent::Error {
                code: "rate_limit".into(),
                message: "too many requests".into(),
            }),
        ]);

        let cancel = CancellationToken::new();
        let fault = process_stream(stream, 1, &sid, &persister, &bus, &cancel)
            .await
            .unwrap_err();
        assert_eq!(fault.code, "rate_limit");
        assert!(fault.recoverable);
    }

    #[tokio::test]
    async fn stream_item_error_maps_retryability() {
        let (_store, sid, persister, bus) = fixture();
        let stream = scripted(vec![Err(ProviderError::Auth {
            message: "key expired".into(),
        })]);

        let cancel = CancellationToken::new();
        let fault = process_stream(stream, 1, &sid, &persister, &bus, &cancel)
            .await
            .unwrap_err();
        assert_eq!(fault.code, "auth");
        assert!(!fault.recoverable);
    }

    #[tokio::test]
    async fn stream_ending_without_done_is_a_fault() {
        let (_store, sid, persister, bus) = fixture();
        let stream = scripted(vec![Ok(ProviderEvent::TextDelta { delta: "Hi".into() })]);

        let cancel = CancellationToken::new();
        let fault = process_stream(stream, 1, &sid, &persister, &bus, &cancel)
            .await
            .unwrap_err();
        assert_eq!(fault.code, "incomplete_stream");
    }

    #[tokio::test]
    async fn cancellation_yields_interrupted_outcome() {
        let (_store, sid, persister, bus) = fixture();
        // A stream that never ends on its own.
        let stream: ProviderEventStream = Box::pin(futures::stream::pending());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = process_stream(stream, 1, &sid, &persister, &bus, &cancel)
            .await
            .unwrap();
        assert!(outcome.interrupted);
        assert!(outcome.stop_reason.is_none());
    }

    #[test]
    fn fault_code_classification() {
        assert!(ProviderFault::from_code("rate_limit", "m").recoverable);
        assert!(ProviderFault::from_code("network", "m").recoverable);
        assert!(!ProviderFault::from_code("auth", "m").recoverable);
        assert!(!ProviderFault::from_code("model_not_found", "m").recoverable);
    }
}
