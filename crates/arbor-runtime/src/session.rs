//! Live-session registry and resume.
//!
//! [`SessionManager`] owns the per-session runtime resources — the persister
//! and the active turn's cancellation token — and is the entry point the RPC
//! layer drives: resume a session (projection at head), start a turn
//! (spawned; results arrive as broadcast events), cancel a turn, subscribe
//! to live events.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use arbor_context::{ContextManager, ContextSnapshot};
use arbor_core::{
    AssistantContent, Message, ToolResultMessageContent, TurnContext, UserContent,
    UserMessageContent,
};
use arbor_events::sqlite::row_types::SessionRow;
use arbor_events::types::state::ProjectedMessageWithIds;
use arbor_events::{EventStore, SessionState};
use arbor_llm::ProviderFactory;

use crate::bus::{BusEvent, NotificationBus, Subscription};
use crate::errors::RuntimeError;
use crate::orchestrator::TurnOrchestrator;
use crate::persister::EventPersister;
use crate::types::ToolDispatcher;

/// A session rebuilt for a client: the row plus the projection at head.
#[derive(Clone, Debug)]
pub struct ResumedSession {
    /// The session row (cached counters included, for display only).
    pub session: SessionRow,
    /// Deterministic state at the session head.
    pub state: SessionState,
}

struct LiveSession {
    persister: Arc<EventPersister>,
    context: Arc<Mutex<ContextManager>>,
    turn_active: AtomicBool,
    /// Latched when a failed turn could not record `turn.failed` even via
    /// the direct store path; new turns are rejected until resume.
    unhealthy: Arc<AtomicBool>,
    cancel: Mutex<Option<CancellationToken>>,
}

/// Registry of live sessions and their runtime resources.
pub struct SessionManager {
    store: Arc<EventStore>,
    bus: Arc<NotificationBus>,
    providers: Arc<dyn ProviderFactory>,
    tools: Option<Arc<dyn ToolDispatcher>>,
    live: DashMap<String, Arc<LiveSession>>,
}

impl SessionManager {
    /// Create a manager over the shared store and bus.
    pub fn new(
        store: Arc<EventStore>,
        bus: Arc<NotificationBus>,
        providers: Arc<dyn ProviderFactory>,
        tools: Option<Arc<dyn ToolDispatcher>>,
    ) -> Self {
        Self {
            store,
            bus,
            providers,
            tools,
            live: DashMap::new(),
        }
    }

    /// The shared event store.
    #[must_use]
    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    /// The shared notification bus.
    #[must_use]
    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    /// Resume a session: the row plus the projected state at head.
    ///
    /// Resume also revives an unhealthy session: its stale runtime entry
    /// (latched persister included) is dropped so the next turn starts with
    /// fresh resources.
    pub fn resume(&self, session_id: &str) -> Result<ResumedSession, RuntimeError> {
        let session = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| {
                RuntimeError::Store(arbor_events::EventStoreError::SessionNotFound(
                    session_id.to_owned(),
                ))
            })?;
        let state = self.store.get_state_at_head(session_id)?;

        let stale = self.live.get(session_id).is_some_and(|live| {
            live.unhealthy.load(Ordering::Acquire) && !live.turn_active.load(Ordering::Acquire)
        });
        if stale {
            let _ = self.live.remove(session_id);
        }

        Ok(ResumedSession { session, state })
    }

    /// Subscribe to a session's live events.
    ///
    /// Returns the subscription together with the current head event ID so
    /// the subscriber can page missing history before switching to live.
    pub fn subscribe(
        &self,
        session_id: &str,
    ) -> Result<(Subscription, Option<String>), RuntimeError> {
        let session = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| {
                RuntimeError::Store(arbor_events::EventStoreError::SessionNotFound(
                    session_id.to_owned(),
                ))
            })?;
        Ok((self.bus.subscribe(session_id), session.head_event_id))
    }

    fn live_session(&self, session_id: &str) -> Result<Arc<LiveSession>, RuntimeError> {
        if let Some(live) = self.live.get(session_id) {
            return Ok(live.clone());
        }
        let session = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| {
                RuntimeError::Store(arbor_events::EventStoreError::SessionNotFound(
                    session_id.to_owned(),
                ))
            })?;
        let persister = Arc::new(EventPersister::new(self.store.clone(), session_id)?);

        let mut context = ContextManager::new(&session.latest_model, &session.working_directory);
        let bus = self.bus.clone();
        let compaction_session = session_id.to_owned();
        context.on_compaction_needed(move || {
            bus.publish(&BusEvent {
                event_type: "context.compaction_needed".into(),
                session_id: compaction_session.clone(),
                sequence: None,
                payload: serde_json::json!({}),
            });
        });

        let live = Arc::new(LiveSession {
            persister,
            context: Arc::new(Mutex::new(context)),
            turn_active: AtomicBool::new(false),
            unhealthy: Arc::new(AtomicBool::new(false)),
            cancel: Mutex::new(None),
        });
        let _ = self.live.insert(session_id.to_owned(), live.clone());
        Ok(live)
    }

    /// Snapshot the live context window for a session, if one is loaded.
    #[must_use]
    pub fn context_snapshot(&self, session_id: &str) -> Option<ContextSnapshot> {
        self.live
            .get(session_id)
            .map(|live| live.context.lock().snapshot())
    }

    /// Start a turn. Returns once the turn is accepted; events arrive on the
    /// bus as the turn progresses.
    pub async fn start_turn(
        self: &Arc<Self>,
        session_id: &str,
        content: Value,
    ) -> Result<tokio::task::JoinHandle<()>, RuntimeError> {
        let session = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| {
                RuntimeError::Store(arbor_events::EventStoreError::SessionNotFound(
                    session_id.to_owned(),
                ))
            })?;
        if !session.is_active() {
            return Err(RuntimeError::Store(
                arbor_events::EventStoreError::SessionEnded(session_id.to_owned()),
            ));
        }

        let live = self.live_session(session_id)?;
        if live.unhealthy.load(Ordering::Acquire) {
            return Err(RuntimeError::SessionUnhealthy(session_id.to_owned()));
        }
        if live.turn_active.swap(true, Ordering::AcqRel) {
            return Err(RuntimeError::TurnActive(session_id.to_owned()));
        }

        // Sync the in-memory window with the log before streaming. A model
        // switch recorded since the last turn may shrink the window here,
        // which is where the compaction callback fires.
        {
            let state = self.store.get_state_at_head(session_id)?;
            let mut context = live.context.lock();
            context.set_messages(to_messages(&state.messages));
            if context.model() != session.latest_model {
                context.switch_model(&session.latest_model);
            }
        }

        let provider = match self.providers.create_for_model(&session.latest_model).await {
            Ok(p) => p,
            Err(e) => {
                live.turn_active.store(false, Ordering::Release);
                return Err(e.into());
            }
        };

        let orchestrator = TurnOrchestrator::new(
            session_id.to_owned(),
            self.store.clone(),
            live.persister.clone(),
            self.bus.clone(),
            provider,
            self.tools.clone(),
        )
        .with_context_window(live.context.clone())
        .with_health_flag(live.unhealthy.clone());

        let cancel = CancellationToken::new();
        *live.cancel.lock() = Some(cancel.clone());

        let session_id = session_id.to_owned();
        let live_for_task = live.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = orchestrator.run_turn(content, &cancel).await {
                warn!(session_id, error = %e, "turn ended with runtime error");
            }
            *live_for_task.cancel.lock() = None;
            live_for_task.turn_active.store(false, Ordering::Release);
        });
        Ok(handle)
    }

    /// Cancel the in-flight turn, if any. Returns whether a turn was active.
    pub fn cancel_turn(&self, session_id: &str) -> bool {
        let Some(live) = self.live.get(session_id) else {
            return false;
        };
        let cancel = live.cancel.lock();
        match cancel.as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a turn is currently running for the session.
    #[must_use]
    pub fn is_turn_active(&self, session_id: &str) -> bool {
        self.live
            .get(session_id)
            .is_some_and(|l| l.turn_active.load(Ordering::Acquire))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Projection → conversation model conversion
// ─────────────────────────────────────────────────────────────────────────────

/// Build the provider context from a projected state.
#[must_use]
pub fn to_turn_context(state: &SessionState, tools: Option<&dyn ToolDispatcher>) -> TurnContext {
    TurnContext {
        system: None,
        messages: to_messages(&state.messages),
        tools: tools.map(|t| t.definitions()),
    }
}

/// Convert projected messages (loose JSON) into the typed conversation
/// model handed to providers. Blocks that don't parse degrade to their
/// textual surface rather than dropping the message.
#[must_use]
pub fn to_messages(projected: &[ProjectedMessageWithIds]) -> Vec<Message> {
    projected
        .iter()
        .filter_map(|entry| {
            let msg = &entry.message;
            match msg.role.as_str() {
                "user" => Some(Message::User {
                    content: match &msg.content {
                        Value::String(s) => UserMessageContent::Text(s.clone()),
                        other => UserMessageContent::Blocks(parse_user_blocks(other)),
                    },
                }),
                "assistant" => Some(Message::Assistant {
                    content: parse_assistant_blocks(&msg.content),
                    usage: None,
                    stop_reason: None,
                }),
                "toolResult" => Some(Message::ToolResult {
                    tool_call_id: msg.tool_call_id.clone().unwrap_or_default(),
                    content: match &msg.content {
                        Value::String(s) => ToolResultMessageContent::Text(s.clone()),
                        other => ToolResultMessageContent::Text(flatten_text(other)),
                    },
                    is_error: msg.is_error,
                }),
                _ => None,
            }
        })
        .collect()
}

/// Convert raw user content (string or block array) into a typed message.
pub(crate) fn user_value_to_message(content: &Value) -> Message {
    Message::User {
        content: match content {
            Value::String(s) => UserMessageContent::Text(s.clone()),
            other => UserMessageContent::Blocks(parse_user_blocks(other)),
        },
    }
}

fn parse_user_blocks(content: &Value) -> Vec<UserContent> {
    match serde_json::from_value::<Vec<UserContent>>(content.clone()) {
        Ok(blocks) => blocks,
        Err(_) => vec![UserContent::text(flatten_text(content))],
    }
}

fn parse_assistant_blocks(content: &Value) -> Vec<AssistantContent> {
    match serde_json::from_value::<Vec<AssistantContent>>(content.clone()) {
        Ok(blocks) => blocks,
        Err(_) => vec![AssistantContent::text(flatten_text(content))],
    }
}

/// Extract the textual surface of arbitrary content JSON.
fn flatten_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use arbor_core::{StopReason, TokenUsage};
    use arbor_events::types::state::ProjectedMessage;
    use arbor_events::{ConnectionConfig, new_in_memory, run_migrations};
    use arbor_llm::models::ProviderKind;
    use arbor_llm::provider::{
        CompletedMessage, Provider, ProviderEvent, ProviderEventStream, ProviderResult,
    };

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

    struct OneShotProvider;

    #[async_trait]
    impl Provider for OneShotProvider {
        fn provider_kind(&self) -> ProviderKind {
            ProviderKind::Anthropic
        }
        fn model(&self) -> &str {
            "claude-sonnet-4-5"
        }
        async fn stream(&self, _context: &TurnContext) -> ProviderResult<ProviderEventStream> {
            let events = vec![Ok(ProviderEvent::Done {
                message: CompletedMessage {
                    content: vec![AssistantContent::text("reply")],
                    usage: TokenUsage {
                        input_tokens: 5,
                        output_tokens: 2,
                        ..Default::default()
                    },
                    stop_reason: StopReason::EndTurn,
                    model: "claude-sonnet-4-5".into(),
                },
            })];
            Ok(Box::pin(futures::stream::iter(events)))
        }
    }

    struct OneShotFactory;

    #[async_trait]
    impl ProviderFactory for OneShotFactory {
        async fn create_for_model(
            &self,
            _model: &str,
        ) -> ProviderResult<Arc<dyn Provider>> {
            Ok(Arc::new(OneShotProvider))
        }
    }

    fn manager(store: Arc<EventStore>) -> Arc<SessionManager> {
        Arc::new(SessionManager::new(
            store,
            Arc::new(NotificationBus::new()),
            Arc::new(OneShotFactory),
            None,
        ))
    }

    fn entry(role: &str, content: Value) -> ProjectedMessageWithIds {
        ProjectedMessageWithIds {
            message: ProjectedMessage {
                role: role.into(),
                content,
                tool_call_id: if role == "toolResult" {
                    Some("call_1".into())
                } else {
                    None
                },
                is_error: None,
            },
            event_ids: vec![None],
        }
    }

    // ── Conversion ───────────────────────────────────────────────────

    #[test]
    fn converts_string_user_content() {
        let msgs = to_messages(&[entry("user", Value::String("hello".into()))]);
        assert_eq!(msgs, vec![Message::user("hello")]);
    }

    #[test]
    fn converts_block_user_content() {
        let msgs = to_messages(&[entry(
            "user",
            serde_json::json!([{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]),
        )]);
        match &msgs[0] {
            Message::User {
                content: UserMessageContent::Blocks(blocks),
            } => assert_eq!(blocks.len(), 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn converts_assistant_tool_use_blocks() {
        let msgs = to_messages(&[entry(
            "assistant",
            serde_json::json!([
                {"type": "text", "text": "calling"},
                {"type": "tool_use", "id": "call_1", "name": "bash", "arguments": {}}
            ]),
        )]);
        match &msgs[0] {
            Message::Assistant { content, .. } => {
                assert_eq!(content.len(), 2);
                assert!(matches!(content[1], AssistantContent::ToolUse { .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn converts_tool_result() {
        let msgs = to_messages(&[entry("toolResult", Value::String("output".into()))]);
        match &msgs[0] {
            Message::ToolResult {
                tool_call_id,
                content: ToolResultMessageContent::Text(text),
                ..
            } => {
                assert_eq!(tool_call_id, "call_1");
                assert_eq!(text, "output");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unparseable_blocks_degrade_to_text() {
        let msgs = to_messages(&[entry(
            "assistant",
            serde_json::json!([{"type": "mystery", "text": "still here"}]),
        )]);
        match &msgs[0] {
            Message::Assistant { content, .. } => {
                assert_eq!(content, &vec![AssistantContent::text("still here")]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    // ── Manager ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn resume_returns_row_and_state() {
        let store = make_store();
        let created = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let mgr = manager(store);

        let resumed = mgr.resume(&created.session.id).unwrap();
        assert_eq!(resumed.session.id, created.session.id);
        assert!(resumed.state.messages.is_empty());
        assert_eq!(resumed.state.model, "claude-sonnet-4-5");
    }

    #[tokio::test]
    async fn resume_missing_session_fails() {
        let mgr = manager(make_store());
        assert!(mgr.resume("sess_missing").is_err());
    }

    #[tokio::test]
    async fn subscribe_returns_current_head() {
        let store = make_store();
        let created = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let mgr = manager(store);

        let (_sub, head) = mgr.subscribe(&created.session.id).unwrap();
        assert_eq!(head.as_deref(), Some(created.root_event.id.as_str()));
    }

    #[tokio::test]
    async fn start_turn_runs_to_completion() {
        let store = make_store();
        let created = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let mgr = manager(store.clone());

        let handle = mgr
            .start_turn(&created.session.id, serde_json::json!("hello"))
            .await
            .unwrap();
        handle.await.unwrap();

        let state = store.get_state_at_head(&created.session.id).unwrap();
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].message.role, "user");
        assert_eq!(state.messages[1].message.role, "assistant");
        assert!(!mgr.is_turn_active(&created.session.id));
    }

    #[tokio::test]
    async fn context_window_tracks_completed_turn() {
        let store = make_store();
        let created = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let mgr = manager(store);

        let handle = mgr
            .start_turn(&created.session.id, serde_json::json!("hello"))
            .await
            .unwrap();
        handle.await.unwrap();

        let snapshot = mgr.context_snapshot(&created.session.id).unwrap();
        assert_eq!(snapshot.model, "claude-sonnet-4-5");
        assert_eq!(snapshot.messages.len(), 2);
        assert!(snapshot.current_tokens > 0);
    }

    #[tokio::test]
    async fn unhealthy_session_rejects_turns_until_resume() {
        let store = make_store();
        let created = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let sid = created.session.id.clone();
        let mgr = manager(store);

        // Run one turn so the live entry exists, then latch it unhealthy.
        let handle = mgr.start_turn(&sid, serde_json::json!("one")).await.unwrap();
        handle.await.unwrap();
        mgr.live
            .get(&sid)
            .unwrap()
            .unhealthy
            .store(true, Ordering::Release);

        let err = mgr
            .start_turn(&sid, serde_json::json!("two"))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::SessionUnhealthy(_)));

        // Resume drops the stale runtime entry; turns are accepted again.
        let _ = mgr.resume(&sid).unwrap();
        let handle = mgr.start_turn(&sid, serde_json::json!("three")).await.unwrap();
        handle.await.unwrap();
        assert!(!mgr.is_turn_active(&sid));
    }

    #[tokio::test]
    async fn start_turn_on_ended_session_fails() {
        let store = make_store();
        let created = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let _ = store.end_session(&created.session.id, "aborted").unwrap();
        let mgr = manager(store);

        let err = mgr
            .start_turn(&created.session.id, serde_json::json!("hello"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Store(arbor_events::EventStoreError::SessionEnded(_))
        ));
    }

    #[tokio::test]
    async fn cancel_without_active_turn_is_false() {
        let store = make_store();
        let created = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let mgr = manager(store);
        assert!(!mgr.cancel_turn(&created.session.id));
    }
}
