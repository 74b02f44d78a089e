//! Turn orchestrator — the per-session finite-state loop.
//!
//! States: idle → appending_user → streaming → draining → idle (or failed).
//! Given a user message, the orchestrator persists it through the persister,
//! drives the provider stream, converts stream events into persisted events,
//! dispatches tools while the model keeps asking for them, and broadcasts
//! every persisted event on the notification bus.
//!
//! Error policy: every failed turn produces exactly one `turn.failed` event.
//! Cancellation flushes (never aborts) enqueued persister writes so the log
//! is not truncated mid-message.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use arbor_context::ContextManager;
use arbor_core::{Message, StopReason, ToolResultMessageContent};
use arbor_events::sqlite::row_types::EventRow;
use arbor_events::{AppendOptions, EventStore, EventType};
use arbor_llm::Provider;

use crate::bus::{BusEvent, NotificationBus};
use crate::errors::RuntimeError;
use crate::persister::EventPersister;
use crate::session::{to_turn_context, user_value_to_message};
use crate::stream_processor::{ProviderFault, process_stream};
use crate::types::{ToolDispatcher, TurnOutcome, TurnPhase};

/// Default per-turn timeout, from streaming entry to the provider's done.
pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(120);

/// Per-session turn state machine.
pub struct TurnOrchestrator {
    session_id: String,
    store: Arc<EventStore>,
    persister: Arc<EventPersister>,
    bus: Arc<NotificationBus>,
    provider: Arc<dyn Provider>,
    tools: Option<Arc<dyn ToolDispatcher>>,
    context_window: Option<Arc<Mutex<ContextManager>>>,
    health: Option<Arc<AtomicBool>>,
    turn_timeout: Duration,
    phase: Mutex<TurnPhase>,
}

impl TurnOrchestrator {
    /// Create an orchestrator for one session.
    pub fn new(
        session_id: impl Into<String>,
        store: Arc<EventStore>,
        persister: Arc<EventPersister>,
        bus: Arc<NotificationBus>,
        provider: Arc<dyn Provider>,
        tools: Option<Arc<dyn ToolDispatcher>>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            store,
            persister,
            bus,
            provider,
            tools,
            context_window: None,
            health: None,
            turn_timeout: DEFAULT_TURN_TIMEOUT,
            phase: Mutex::new(TurnPhase::Idle),
        }
    }

    /// Override the per-turn timeout.
    #[must_use]
    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    /// Attach the session's in-memory context window; the orchestrator
    /// updates it as messages are persisted.
    #[must_use]
    pub fn with_context_window(mut self, context: Arc<Mutex<ContextManager>>) -> Self {
        self.context_window = Some(context);
        self
    }

    /// Attach the session's unhealthy flag. Set when a failed turn cannot
    /// record its `turn.failed` event even through the direct store path;
    /// the session manager rejects new turns while it is set.
    #[must_use]
    pub fn with_health_flag(mut self, unhealthy: Arc<AtomicBool>) -> Self {
        self.health = Some(unhealthy);
        self
    }

    fn track_message(&self, message: Message) {
        if let Some(context) = &self.context_window {
            context.lock().add_message(message);
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> TurnPhase {
        *self.phase.lock()
    }

    /// Run one turn for the given user content.
    ///
    /// Returns to idle whatever happens; a session stays usable after a
    /// failed or interrupted turn.
    pub async fn run_turn(
        &self,
        user_content: Value,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, RuntimeError> {
        {
            let mut phase = self.phase.lock();
            if *phase != TurnPhase::Idle {
                return Err(RuntimeError::TurnActive(self.session_id.clone()));
            }
            *phase = TurnPhase::AppendingUser;
        }

        let result = self.run_turn_inner(user_content, cancel).await;
        *self.phase.lock() = TurnPhase::Idle;
        result
    }

    async fn run_turn_inner(
        &self,
        user_content: Value,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, RuntimeError> {
        let turn = self.store.get_state_at_head(&self.session_id)?.turn_count + 1;
        debug!(session_id = %self.session_id, turn, "turn starting");

        // 1. Persist the user message; a dead persister fails the turn
        // before any streaming happens.
        let user_message = user_value_to_message(&user_content);
        let Some(user_row) = self
            .persister
            .append_async(
                EventType::MessageUser,
                json!({"content": user_content, "turn": turn}),
            )
            .await
        else {
            return Ok(self.persistence_failed(turn).await);
        };
        self.publish_row(&user_row);
        self.track_message(user_message);

        self.persist_and_publish(EventType::StreamTurnStart, json!({"turn": turn}));

        *self.phase.lock() = TurnPhase::Streaming;
        let deadline = Instant::now() + self.turn_timeout;
        let mut total_usage = arbor_core::TokenUsage::default();
        let mut tool_calls_executed = 0usize;

        loop {
            // Make sure every prior fire-and-forget write has committed so
            // the projection below sees a settled chain.
            self.persister.flush().await;
            if self.persister.has_error() {
                return Ok(self.persistence_failed(turn).await);
            }

            let head = self
                .persister
                .pending_head_event_id()
                .ok_or_else(|| RuntimeError::Internal("persister has no pending head".into()))?;
            let state = self.store.get_state_at(&head)?;
            let context = to_turn_context(&state, self.tools.as_deref());

            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Ok(self.turn_timed_out(turn).await);
            };

            let stream = match tokio::time::timeout(remaining, self.provider.stream(&context)).await
            {
                Err(_) => return Ok(self.turn_timed_out(turn).await),
                Ok(Err(e)) => {
                    let fault = ProviderFault {
                        code: e.code().to_owned(),
                        message: e.to_string(),
                        recoverable: e.is_retryable(),
                    };
                    return Ok(self.provider_failed(turn, fault).await);
                }
                Ok(Ok(stream)) => stream,
            };

            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Ok(self.turn_timed_out(turn).await);
            };
            let processed = tokio::time::timeout(
                remaining,
                process_stream(
                    stream,
                    turn,
                    &self.session_id,
                    &self.persister,
                    &self.bus,
                    cancel,
                ),
            )
            .await;

            let outcome = match processed {
                Err(_) => return Ok(self.turn_timed_out(turn).await),
                Ok(Err(fault)) => return Ok(self.provider_failed(turn, fault).await),
                Ok(Ok(outcome)) => outcome,
            };

            if outcome.interrupted {
                return Ok(self.turn_interrupted(turn, outcome.partial_text).await);
            }

            if let Some(usage) = &outcome.usage {
                total_usage.accumulate(usage);
            }

            // 2. Persist the full assistant message.
            let mut payload = json!({
                "content": serde_json::to_value(&outcome.content)?,
                "turn": turn,
            });
            if let Some(stop) = outcome.stop_reason {
                payload["stopReason"] = json!(stop.as_str());
            }
            if let Some(model) = &outcome.model {
                payload["model"] = json!(model);
            }
            if let Some(usage) = &outcome.usage {
                payload["tokenUsage"] = serde_json::to_value(usage)?;
            }
            let Some(assistant_row) = self
                .persister
                .append_async(EventType::MessageAssistant, payload)
                .await
            else {
                return Ok(self.persistence_failed(turn).await);
            };
            self.publish_row(&assistant_row);
            self.track_message(Message::Assistant {
                content: outcome.content.clone(),
                usage: outcome.usage,
                stop_reason: outcome.stop_reason,
            });

            // 3. Drain: tools or turn end.
            *self.phase.lock() = TurnPhase::Draining;

            let wants_tools = outcome.stop_reason == Some(StopReason::ToolUse)
                && !outcome.tool_calls.is_empty();
            if wants_tools {
                if let Some(dispatcher) = &self.tools {
                    let mut appended = 0usize;
                    for call in &outcome.tool_calls {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let result = dispatcher.dispatch(call, cancel).await;
                        let Some(row) = self
                            .persister
                            .append_async(
                                EventType::ToolResult,
                                json!({
                                    "toolCallId": call.id,
                                    "content": result.content.clone(),
                                    "isError": result.is_error,
                                    "turn": turn,
                                }),
                            )
                            .await
                        else {
                            return Ok(self.persistence_failed(turn).await);
                        };
                        self.publish_row(&row);
                        self.track_message(Message::ToolResult {
                            tool_call_id: call.id.clone(),
                            content: ToolResultMessageContent::Text(result.content),
                            is_error: if result.is_error { Some(true) } else { None },
                        });
                        appended += 1;
                        tool_calls_executed += 1;
                    }

                    if cancel.is_cancelled() {
                        return Ok(self.turn_interrupted(turn, None).await);
                    }
                    if appended > 0 {
                        *self.phase.lock() = TurnPhase::Streaming;
                        continue;
                    }
                } else {
                    warn!(
                        session_id = %self.session_id,
                        turn,
                        "provider requested tools but no dispatcher is configured"
                    );
                }
            }

            // 4. Turn complete.
            let mut end_payload = json!({"turn": turn});
            end_payload["tokenUsage"] = serde_json::to_value(total_usage)?;
            if let Some(stop) = outcome.stop_reason {
                end_payload["stopReason"] = json!(stop.as_str());
            }
            self.persist_and_publish(EventType::StreamTurnEnd, end_payload);
            self.persister.flush().await;

            info!(
                session_id = %self.session_id,
                turn,
                tools = tool_calls_executed,
                stop_reason = ?outcome.stop_reason,
                "turn completed"
            );

            return Ok(TurnOutcome {
                turn,
                success: true,
                interrupted: false,
                stop_reason: outcome.stop_reason,
                token_usage: Some(total_usage),
                tool_calls_executed,
                error: None,
                recoverable: false,
            });
        }
    }

    // ── Failure paths ───────────────────────────────────────────────────

    /// Provider fault: append `error.provider` then exactly one
    /// `turn.failed`, in that order.
    async fn provider_failed(&self, turn: i64, fault: ProviderFault) -> TurnOutcome {
        *self.phase.lock() = TurnPhase::Failed;
        warn!(
            session_id = %self.session_id,
            turn,
            code = %fault.code,
            recoverable = fault.recoverable,
            "provider failed"
        );

        let rows = self
            .persister
            .append_multiple(vec![
                (
                    EventType::ErrorProvider,
                    json!({"code": fault.code, "message": fault.message}),
                ),
                (
                    EventType::TurnFailed,
                    json!({
                        "turn": turn,
                        "error": fault.message,
                        "code": fault.code,
                        "recoverable": fault.recoverable,
                    }),
                ),
            ])
            .await;
        match rows {
            Some(rows) => {
                for row in &rows {
                    self.publish_row(row);
                }
            }
            None => self.turn_failed_direct(turn, &fault.message, Some(&fault.code), fault.recoverable),
        }

        TurnOutcome {
            turn,
            success: false,
            error: Some(fault.message),
            recoverable: fault.recoverable,
            ..Default::default()
        }
    }

    /// Per-turn timeout elapsed.
    async fn turn_timed_out(&self, turn: i64) -> TurnOutcome {
        *self.phase.lock() = TurnPhase::Failed;
        let message = format!("turn timed out after {:?}", self.turn_timeout);
        let row = self
            .persister
            .append_async(
                EventType::TurnFailed,
                json!({
                    "turn": turn,
                    "error": message,
                    "code": "timeout",
                    "recoverable": true,
                }),
            )
            .await;
        match row {
            Some(row) => self.publish_row(&row),
            None => self.turn_failed_direct(turn, &message, Some("timeout"), true),
        }

        TurnOutcome {
            turn,
            success: false,
            error: Some(message),
            recoverable: true,
            ..Default::default()
        }
    }

    /// The persister latched mid-turn; record the failure with a best-effort
    /// direct store write, since the persister itself can no longer append.
    async fn persistence_failed(&self, turn: i64) -> TurnOutcome {
        *self.phase.lock() = TurnPhase::Failed;
        let message = self
            .persister
            .error()
            .unwrap_or_else(|| "event persistence failed".into());
        self.turn_failed_direct(turn, &message, Some("persistence"), false);

        TurnOutcome {
            turn,
            success: false,
            error: Some(message),
            recoverable: false,
            ..Default::default()
        }
    }

    /// Cancellation: append `notification.interrupted` and flush so nothing
    /// enqueued is lost.
    async fn turn_interrupted(&self, turn: i64, partial: Option<String>) -> TurnOutcome {
        debug!(session_id = %self.session_id, turn, "turn interrupted");
        let mut payload = json!({"turn": turn});
        if let Some(partial) = &partial {
            payload["partialContent"] = json!(partial);
        }
        if let Some(row) = self
            .persister
            .append_async(EventType::NotificationInterrupted, payload)
            .await
        {
            self.publish_row(&row);
        }
        self.persister.flush().await;

        TurnOutcome {
            turn,
            success: true,
            interrupted: true,
            ..Default::default()
        }
    }

    /// Best-effort `turn.failed` write that bypasses the (possibly latched)
    /// persister. If even this fails, the session's unhealthy flag latches
    /// and new turns are rejected until resume.
    fn turn_failed_direct(&self, turn: i64, error: &str, code: Option<&str>, recoverable: bool) {
        let result = self.store.append(&AppendOptions {
            session_id: &self.session_id,
            event_type: EventType::TurnFailed,
            payload: json!({
                "turn": turn,
                "error": error,
                "code": code,
                "recoverable": recoverable,
            }),
            parent_id: None,
        });
        match result {
            Ok(row) => self.publish_row(&row),
            Err(e) => {
                if let Some(unhealthy) = &self.health {
                    unhealthy.store(true, Ordering::Release);
                }
                warn!(
                    session_id = %self.session_id,
                    turn,
                    error = %e,
                    "failed to record turn.failed; session unhealthy until resume"
                );
            }
        }
    }

    // ── Publishing ──────────────────────────────────────────────────────

    fn publish_row(&self, row: &EventRow) {
        self.bus.publish(&BusEvent {
            event_type: row.event_type.clone(),
            session_id: row.session_id.clone(),
            sequence: Some(row.sequence),
            payload: serde_json::from_str(&row.payload).unwrap_or(Value::Null),
        });
    }

    fn persist_and_publish(&self, event_type: EventType, payload: Value) {
        let bus = self.bus.clone();
        self.persister.append_with(event_type, payload, move |row| {
            bus.publish(&BusEvent {
                event_type: row.event_type.clone(),
                session_id: row.session_id.clone(),
                sequence: Some(row.sequence),
                payload: serde_json::from_str(&row.payload).unwrap_or(Value::Null),
            });
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
