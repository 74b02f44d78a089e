//! High-level transactional [`EventStore`] API.
//!
//! Composes the repositories into atomic, session-centric methods. Every
//! write runs inside a single `SQLite` transaction and updates workspace and
//! session `last_activity_at` atomically — callers never observe partial
//! state. A per-session advisory lock serialises the sequence-increment +
//! head-update critical section; readers never take it.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use rusqlite::Connection;
use serde_json::Value;

use crate::errors::{EventStoreError, Result};
use crate::projection::project_state;
use crate::sqlite::connection::{ConnectionPool, PooledConnection};
use crate::sqlite::repositories::blob::BlobRepo;
use crate::sqlite::repositories::event::{EventRepo, ListEventsOptions};
use crate::sqlite::repositories::search::{SearchOptions, SearchRepo};
use crate::sqlite::repositories::session::{
    CreateSessionOptions, IncrementCounters, ListSessionsOptions, SessionRepo,
};
use crate::sqlite::repositories::workspace::WorkspaceRepo;
use crate::sqlite::row_types::{EventRow, SessionRow, WorkspaceRow};
use crate::types::{EventType, SessionEvent, SessionState};

/// Result of creating a new session.
#[derive(Debug)]
pub struct CreateSessionResult {
    /// The created session.
    pub session: SessionRow,
    /// The root `session.start` event.
    pub root_event: EventRow,
}

/// Result of forking a session.
#[derive(Debug)]
pub struct ForkResult {
    /// The newly created (forked) session.
    pub session: SessionRow,
    /// The root `session.fork` event.
    pub fork_event: EventRow,
}

/// Options for appending an event.
pub struct AppendOptions<'a> {
    /// Session to append to.
    pub session_id: &'a str,
    /// Event type.
    pub event_type: EventType,
    /// Event payload (JSON).
    pub payload: Value,
    /// Explicit parent. If `None`, chains from the session head.
    pub parent_id: Option<&'a str>,
}

/// Options for forking a session.
#[derive(Default)]
pub struct ForkOptions<'a> {
    /// Optional name for the forked session.
    pub name: Option<&'a str>,
}

/// High-level event store wrapping a connection pool and all repositories.
pub struct EventStore {
    pool: ConnectionPool,
    append_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl EventStore {
    /// Create a new store with the given connection pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self {
            pool,
            append_locks: DashMap::new(),
        }
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.append_locks
            .entry(session_id.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Session lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Create a new session with a root `session.start` event.
    ///
    /// Atomic: workspace get-or-create, session insertion, root event
    /// insertion, head/root pointer updates, and counter increments all
    /// happen in a single transaction.
    pub fn create_session(
        &self,
        workspace_path: &str,
        working_directory: &str,
        model: &str,
        title: Option<&str>,
    ) -> Result<CreateSessionResult> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let ws = WorkspaceRepo::get_or_create(&tx, workspace_path, None)?;
        let session = SessionRepo::create(
            &tx,
            &CreateSessionOptions {
                workspace_id: &ws.id,
                model,
                working_directory,
                title,
                parent_session_id: None,
                fork_from_event_id: None,
            },
        )?;

        let event = SessionEvent {
            id: SessionEvent::generate_id(),
            parent_id: None,
            session_id: session.id.clone(),
            workspace_id: ws.id.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            event_type: EventType::SessionStart,
            sequence: 0,
            payload: serde_json::json!({
                "workspacePath": workspace_path,
                "workingDirectory": working_directory,
                "model": model,
            }),
        };
        EventRepo::insert(&tx, &event)?;

        let _ = SessionRepo::update_root(&tx, &session.id, &event.id)?;
        let _ = SessionRepo::update_head(&tx, &session.id, &event.id)?;
        let _ = SessionRepo::increment_counters(
            &tx,
            &session.id,
            &IncrementCounters {
                event_count: Some(1),
                ..Default::default()
            },
        )?;
        let _ = WorkspaceRepo::touch(&tx, &ws.id)?;

        tx.commit()?;

        let session = SessionRepo::get_by_id(&conn, &session.id)?
            .ok_or(EventStoreError::SessionNotFound(session.id))?;
        let root_event = EventRepo::get_by_id(&conn, &event.id)?
            .ok_or(EventStoreError::EventNotFound(event.id))?;

        Ok(CreateSessionResult {
            session,
            root_event,
        })
    }

    /// Append an event to a session.
    ///
    /// Atomic: sequence generation, event insertion, head update, counter
    /// increments, and activity timestamps all happen in one transaction
    /// under the session's append lock.
    ///
    /// Fails with [`EventStoreError::SessionNotFound`],
    /// [`EventStoreError::ParentNotFound`], or
    /// [`EventStoreError::SessionEnded`].
    pub fn append(&self, opts: &AppendOptions<'_>) -> Result<EventRow> {
        let lock = self.session_lock(opts.session_id);
        let _guard = lock.lock();

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let session = Self::active_session(&tx, opts.session_id)?;
        let event = Self::append_in_tx(
            &tx,
            &session,
            &opts.event_type,
            opts.payload.clone(),
            opts.parent_id,
        )?;
        Self::finish_append(&tx, &session, std::slice::from_ref(&event))?;

        tx.commit()?;

        EventRepo::get_by_id(&conn, &event.id)?.ok_or(EventStoreError::EventNotFound(event.id))
    }

    /// Append a chain of events atomically.
    ///
    /// Event *n+1*'s parent is event *n*; the first event chains from the
    /// session head. Head and counter updates happen once at the end.
    pub fn append_multiple(
        &self,
        session_id: &str,
        items: &[(EventType, Value)],
    ) -> Result<Vec<EventRow>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let lock = self.session_lock(session_id);
        let _guard = lock.lock();

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let session = Self::active_session(&tx, session_id)?;
        let mut events = Vec::with_capacity(items.len());
        let mut parent: Option<String> = None;
        for (event_type, payload) in items {
            let event = Self::append_in_tx(
                &tx,
                &session,
                event_type,
                payload.clone(),
                parent.as_deref(),
            )?;
            parent = Some(event.id.clone());
            events.push(event);
        }
        Self::finish_append(&tx, &session, &events)?;

        tx.commit()?;

        events
            .into_iter()
            .map(|e| {
                EventRepo::get_by_id(&conn, &e.id)?.ok_or(EventStoreError::EventNotFound(e.id))
            })
            .collect()
    }

    /// Fork a session from a specific event.
    ///
    /// Creates a new session whose root `session.fork` event has its
    /// `parent_id` pointing into the source session's event tree, so ancestor
    /// walks from the fork traverse the shared history. The forked session's
    /// cached model, reasoning level, and token counters are initialised by
    /// replaying the ancestor chain.
    pub fn fork(&self, fork_point_event_id: &str, opts: &ForkOptions<'_>) -> Result<ForkResult> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let source_event = EventRepo::get_by_id(&tx, fork_point_event_id)?
            .ok_or_else(|| EventStoreError::EventNotFound(fork_point_event_id.to_owned()))?;
        let source_session = SessionRepo::get_by_id(&tx, &source_event.session_id)?
            .ok_or_else(|| EventStoreError::SessionNotFound(source_event.session_id.clone()))?;

        // Replay the inherited chain to seed the fork's cached state.
        let ancestors = Self::ancestor_events(&tx, fork_point_event_id)?;
        let state = project_state(&ancestors);
        let model = if state.model.is_empty() {
            source_session.latest_model.clone()
        } else {
            state.model.clone()
        };

        let session = SessionRepo::create(
            &tx,
            &CreateSessionOptions {
                workspace_id: &source_session.workspace_id,
                model: &model,
                working_directory: &source_session.working_directory,
                title: opts.name,
                parent_session_id: Some(&source_session.id),
                fork_from_event_id: Some(fork_point_event_id),
            },
        )?;

        let fork_event = SessionEvent {
            id: SessionEvent::generate_id(),
            parent_id: Some(fork_point_event_id.to_owned()),
            session_id: session.id.clone(),
            workspace_id: source_session.workspace_id.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            event_type: EventType::SessionFork,
            sequence: 0,
            payload: serde_json::json!({
                "parentSessionId": source_session.id,
                "forkFromEventId": fork_point_event_id,
                "name": opts.name,
            }),
        };
        EventRepo::insert(&tx, &fork_event)?;

        let _ = SessionRepo::update_root(&tx, &session.id, &fork_event.id)?;
        let _ = SessionRepo::update_head(&tx, &session.id, &fork_event.id)?;
        let _ = SessionRepo::update_latest_reasoning_level(
            &tx,
            &session.id,
            state.reasoning_level.as_str(),
        )?;
        #[allow(clippy::cast_possible_wrap)]
        let _ = SessionRepo::increment_counters(
            &tx,
            &session.id,
            &IncrementCounters {
                event_count: Some(1),
                message_count: Some(state.messages.len() as i64),
                input_tokens: Some(state.token_usage.input_tokens as i64),
                output_tokens: Some(state.token_usage.output_tokens as i64),
                cache_read_tokens: state.token_usage.cache_read_tokens.map(|t| t as i64),
                cache_creation_tokens: state.token_usage.cache_creation_tokens.map(|t| t as i64),
            },
        )?;
        let _ = WorkspaceRepo::touch(&tx, &source_session.workspace_id)?;

        tx.commit()?;

        let session = SessionRepo::get_by_id(&conn, &session.id)?
            .ok_or(EventStoreError::SessionNotFound(session.id))?;
        let fork_event = EventRepo::get_by_id(&conn, &fork_event.id)?
            .ok_or(EventStoreError::EventNotFound(fork_event.id))?;

        Ok(ForkResult {
            session,
            fork_event,
        })
    }

    /// Delete a message by appending a `message.deleted` event.
    ///
    /// The target must be `message.user`, `message.assistant`, or
    /// `tool.result`. The original event is never modified — deletion is
    /// recorded as a new event and applied during projection. Deleting an
    /// already-deleted message is allowed and appends another delete event
    /// with the same observable effect.
    pub fn delete_message(&self, session_id: &str, target_event_id: &str) -> Result<EventRow> {
        let target = {
            let conn = self.conn()?;
            EventRepo::get_by_id(&conn, target_event_id)?
                .ok_or_else(|| EventStoreError::EventNotFound(target_event_id.to_owned()))?
        };

        let target_type: EventType = target
            .event_type
            .parse()
            .unwrap_or(EventType::Unknown(target.event_type.clone()));
        if !target_type.is_deletable() {
            return Err(EventStoreError::InvalidOperation(format!(
                "cannot delete event of type '{}' — only messages and tool results can be deleted",
                target.event_type
            )));
        }

        self.append(&AppendOptions {
            session_id,
            event_type: EventType::MessageDeleted,
            payload: serde_json::json!({
                "targetEventId": target_event_id,
                "targetType": target.event_type,
            }),
            parent_id: None,
        })
    }

    /// End a session by appending a `session.end` event.
    ///
    /// The append also flips the session's end flag (see `append_in_tx`),
    /// after which further appends fail with `SessionEnded`.
    pub fn end_session(&self, session_id: &str, reason: &str) -> Result<EventRow> {
        self.append(&AppendOptions {
            session_id,
            event_type: EventType::SessionEnd,
            payload: serde_json::json!({ "reason": reason }),
            parent_id: None,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Event retrieval
    // ─────────────────────────────────────────────────────────────────────

    /// Get a single event by ID.
    pub fn get_event(&self, event_id: &str) -> Result<Option<EventRow>> {
        let conn = self.conn()?;
        EventRepo::get_by_id(&conn, event_id)
    }

    /// Get events owned by a session, ascending by sequence.
    ///
    /// Ancestors inherited through a fork are not included.
    pub fn get_events_by_session(
        &self,
        session_id: &str,
        opts: ListEventsOptions,
    ) -> Result<Vec<EventRow>> {
        let conn = self.conn()?;
        EventRepo::get_by_session(&conn, session_id, opts)
    }

    /// Get events with `sequence > after_sequence`.
    pub fn get_events_since(
        &self,
        session_id: &str,
        after_sequence: i64,
        limit: Option<i64>,
    ) -> Result<Vec<EventRow>> {
        let conn = self.conn()?;
        EventRepo::get_since(&conn, session_id, after_sequence, limit)
    }

    /// Ancestor chain from the root `session.start` to the given event,
    /// inclusive, crossing fork boundaries.
    pub fn get_ancestors(&self, event_id: &str) -> Result<Vec<EventRow>> {
        let conn = self.conn()?;
        EventRepo::get_ancestors(&conn, event_id)
    }

    /// Direct children of an event.
    pub fn get_children(&self, event_id: &str) -> Result<Vec<EventRow>> {
        let conn = self.conn()?;
        EventRepo::get_children(&conn, event_id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // State projection
    // ─────────────────────────────────────────────────────────────────────

    /// Project session state at a specific event.
    ///
    /// Pure replay over the ancestor chain; cached session counters are
    /// never consulted.
    pub fn get_state_at(&self, event_id: &str) -> Result<SessionState> {
        let conn = self.conn()?;
        if !EventRepo::exists(&conn, event_id)? {
            return Err(EventStoreError::EventNotFound(event_id.to_owned()));
        }
        let events = Self::ancestor_events(&conn, event_id)?;
        Ok(project_state(&events))
    }

    /// Project session state at the session's current head.
    pub fn get_state_at_head(&self, session_id: &str) -> Result<SessionState> {
        let head = self
            .get_session(session_id)?
            .ok_or_else(|| EventStoreError::SessionNotFound(session_id.to_owned()))?
            .head_event_id
            .ok_or_else(|| EventStoreError::InvalidOperation("session has no head".into()))?;
        self.get_state_at(&head)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Session / workspace access
    // ─────────────────────────────────────────────────────────────────────

    /// Get session by ID.
    pub fn get_session(&self, session_id: &str) -> Result<Option<SessionRow>> {
        let conn = self.conn()?;
        SessionRepo::get_by_id(&conn, session_id)
    }

    /// List sessions ordered by last activity, newest first.
    pub fn list_sessions(&self, opts: ListSessionsOptions<'_>) -> Result<Vec<SessionRow>> {
        let conn = self.conn()?;
        SessionRepo::list(&conn, opts)
    }

    /// Get workspace by canonical path.
    pub fn get_workspace_by_path(&self, path: &str) -> Result<Option<WorkspaceRow>> {
        let conn = self.conn()?;
        WorkspaceRepo::get_by_path(&conn, path)
    }

    /// List all workspaces.
    pub fn list_workspaces(&self) -> Result<Vec<WorkspaceRow>> {
        let conn = self.conn()?;
        WorkspaceRepo::list(&conn)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Blobs
    // ─────────────────────────────────────────────────────────────────────

    /// Store blob content (SHA-256 deduplicated).
    pub fn store_blob(&self, content: &[u8], mime_type: &str) -> Result<String> {
        let conn = self.conn()?;
        BlobRepo::store(&conn, content, mime_type)
    }

    /// Get blob content by ID.
    pub fn get_blob_content(&self, blob_id: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn()?;
        BlobRepo::get_content(&conn, blob_id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Search
    // ─────────────────────────────────────────────────────────────────────

    /// Full-text search across events.
    pub fn search(
        &self,
        query: &str,
        opts: SearchOptions<'_>,
    ) -> Result<Vec<crate::types::SearchResult>> {
        let conn = self.conn()?;
        SearchRepo::search(&conn, query, opts)
    }

    /// Re-derive the full-text index for one session (recovery path).
    pub fn rebuild_session_index(&self, session_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        SearchRepo::rebuild_session_index(&conn, session_id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internal
    // ─────────────────────────────────────────────────────────────────────

    fn active_session(conn: &Connection, session_id: &str) -> Result<SessionRow> {
        let session = SessionRepo::get_by_id(conn, session_id)?
            .ok_or_else(|| EventStoreError::SessionNotFound(session_id.to_owned()))?;
        if !session.is_active() {
            return Err(EventStoreError::SessionEnded(session_id.to_owned()));
        }
        Ok(session)
    }

    /// Insert one event, resolving its parent and sequence. Head, counters,
    /// and activity stamps are applied by `finish_append` so multi-appends
    /// update them once.
    fn append_in_tx(
        conn: &Connection,
        session: &SessionRow,
        event_type: &EventType,
        payload: Value,
        parent_id: Option<&str>,
    ) -> Result<SessionEvent> {
        let parent_id = match parent_id {
            Some(pid) => {
                if !EventRepo::exists(conn, pid)? {
                    return Err(EventStoreError::ParentNotFound(pid.to_owned()));
                }
                Some(pid.to_owned())
            }
            None => session.head_event_id.clone(),
        };

        let sequence = EventRepo::next_sequence(conn, &session.id)?;
        let event = SessionEvent {
            id: SessionEvent::generate_id(),
            parent_id,
            session_id: session.id.clone(),
            workspace_id: session.workspace_id.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            event_type: event_type.clone(),
            sequence,
            payload,
        };
        EventRepo::insert(conn, &event)?;
        Ok(event)
    }

    /// Apply head update, counters, config side effects, and activity stamps
    /// for a batch of freshly inserted events.
    fn finish_append(conn: &Connection, session: &SessionRow, events: &[SessionEvent]) -> Result<()> {
        let Some(last) = events.last() else {
            return Ok(());
        };
        let _ = SessionRepo::update_head(conn, &session.id, &last.id)?;

        let mut counters = IncrementCounters {
            event_count: Some(events.len() as i64),
            ..Default::default()
        };
        for event in events {
            match &event.event_type {
                EventType::MessageUser | EventType::MessageAssistant => {
                    counters.message_count = Some(counters.message_count.unwrap_or(0) + 1);
                }
                EventType::ConfigModelSwitch => {
                    if let Some(model) = event.payload.get("newModel").and_then(Value::as_str) {
                        let _ = SessionRepo::update_latest_model(conn, &session.id, model)?;
                    }
                }
                EventType::ConfigReasoningLevel => {
                    if let Some(level) = event.payload.get("newLevel").and_then(Value::as_str) {
                        let _ =
                            SessionRepo::update_latest_reasoning_level(conn, &session.id, level)?;
                    }
                }
                EventType::SessionEnd => {
                    let _ = SessionRepo::mark_ended(conn, &session.id)?;
                }
                _ => {}
            }

            if let Some(tu) = event.payload.get("tokenUsage") {
                let add = |slot: &mut Option<i64>, key: &str| {
                    if let Some(v) = tu.get(key).and_then(Value::as_i64) {
                        *slot = Some(slot.unwrap_or(0) + v);
                    }
                };
                add(&mut counters.input_tokens, "inputTokens");
                add(&mut counters.output_tokens, "outputTokens");
                add(&mut counters.cache_read_tokens, "cacheReadTokens");
                add(&mut counters.cache_creation_tokens, "cacheCreationTokens");
            }
        }
        let _ = SessionRepo::increment_counters(conn, &session.id, &counters)?;
        let _ = SessionRepo::touch(conn, &session.id)?;
        let _ = WorkspaceRepo::touch(conn, &session.workspace_id)?;
        Ok(())
    }

    fn ancestor_events(conn: &Connection, event_id: &str) -> Result<Vec<SessionEvent>> {
        EventRepo::get_ancestors(conn, event_id)?
            .into_iter()
            .map(EventRow::into_session_event)
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::sqlite::connection::{self, ConnectionConfig};
    use crate::sqlite::migrations::run_migrations;

    fn setup() -> EventStore {
        let pool = connection::new_in_memory(&ConnectionConfig {
            pool_size: 1,
            ..Default::default()
        })
        .unwrap();
        {
            let conn = pool.get().unwrap();
            run_migrations(&conn).unwrap();
        }
        EventStore::new(pool)
    }

    fn user_msg<'a>(session_id: &'a str, text: &str) -> AppendOptions<'a> {
        AppendOptions {
            session_id,
            event_type: EventType::MessageUser,
            payload: serde_json::json!({"content": text, "turn": 1}),
            parent_id: None,
        }
    }

    // ── Session creation ──────────────────────────────────────────────

    #[test]
    fn create_session_basic() {
        let store = setup();
        let result = store
            .create_session("/tmp/project", "/tmp/project", "claude-sonnet-4-5", Some("Test"))
            .unwrap();

        assert!(result.session.id.starts_with("sess_"));
        assert!(result.root_event.id.starts_with("evt_"));
        assert_eq!(result.session.latest_model, "claude-sonnet-4-5");
        assert_eq!(result.session.title.as_deref(), Some("Test"));
        assert_eq!(result.session.event_count, 1);
        assert_eq!(
            result.session.head_event_id.as_deref(),
            Some(result.root_event.id.as_str())
        );
        assert_eq!(
            result.session.root_event_id.as_deref(),
            Some(result.root_event.id.as_str())
        );
        assert!(result.root_event.parent_id.is_none());
        assert_eq!(result.root_event.sequence, 0);
        assert_eq!(result.root_event.event_type, "session.start");
    }

    #[test]
    fn create_session_reuses_workspace() {
        let store = setup();
        let r1 = store
            .create_session("/tmp/project", "/tmp/project", "claude-sonnet-4-5", None)
            .unwrap();
        let r2 = store
            .create_session("/tmp/project", "/tmp/project", "claude-sonnet-4-5", None)
            .unwrap();

        assert_eq!(r1.session.workspace_id, r2.session.workspace_id);
        assert_ne!(r1.session.id, r2.session.id);
        assert!(store.get_workspace_by_path("/tmp/project").unwrap().is_some());
    }

    // ── Event appending ───────────────────────────────────────────────

    #[test]
    fn append_chains_from_head() {
        let store = setup();
        let cr = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let sid = &cr.session.id;

        let e1 = store.append(&user_msg(sid, "Hello")).unwrap();
        let e2 = store
            .append(&AppendOptions {
                session_id: sid,
                event_type: EventType::MessageAssistant,
                payload: serde_json::json!({
                    "content": [{"type": "text", "text": "Hi"}],
                    "turn": 1,
                }),
                parent_id: None,
            })
            .unwrap();

        assert_eq!(e1.parent_id.as_deref(), Some(cr.root_event.id.as_str()));
        assert_eq!(e1.sequence, 1);
        assert_eq!(e2.parent_id.as_deref(), Some(e1.id.as_str()));
        assert_eq!(e2.sequence, 2);

        let session = store.get_session(sid).unwrap().unwrap();
        assert_eq!(session.head_event_id.as_deref(), Some(e2.id.as_str()));
    }

    #[test]
    fn append_updates_counters() {
        let store = setup();
        let cr = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let sid = &cr.session.id;

        store.append(&user_msg(sid, "Hello")).unwrap();
        store
            .append(&AppendOptions {
                session_id: sid,
                event_type: EventType::MessageAssistant,
                payload: serde_json::json!({
                    "content": [{"type": "text", "text": "Hi"}],
                    "turn": 1,
                    "tokenUsage": {"inputTokens": 100, "outputTokens": 50, "cacheReadTokens": 10},
                }),
                parent_id: None,
            })
            .unwrap();

        let session = store.get_session(sid).unwrap().unwrap();
        assert_eq!(session.event_count, 3);
        assert_eq!(session.message_count, 2);
        assert_eq!(session.total_input_tokens, 100);
        assert_eq!(session.total_output_tokens, 50);
        assert_eq!(session.total_cache_read_tokens, 10);
    }

    #[test]
    fn append_with_explicit_parent() {
        let store = setup();
        let cr = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let sid = &cr.session.id;

        let _e1 = store.append(&user_msg(sid, "First")).unwrap();
        let e2 = store
            .append(&AppendOptions {
                session_id: sid,
                event_type: EventType::MessageUser,
                payload: serde_json::json!({"content": "Branch from root", "turn": 1}),
                parent_id: Some(&cr.root_event.id),
            })
            .unwrap();

        assert_eq!(e2.parent_id.as_deref(), Some(cr.root_event.id.as_str()));
    }

    #[test]
    fn append_to_missing_session_fails() {
        let store = setup();
        let err = store.append(&user_msg("sess_missing", "Hello")).unwrap_err();
        assert!(matches!(err, EventStoreError::SessionNotFound(_)));
    }

    #[test]
    fn append_with_missing_parent_fails() {
        let store = setup();
        let cr = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let err = store
            .append(&AppendOptions {
                session_id: &cr.session.id,
                event_type: EventType::MessageUser,
                payload: serde_json::json!({"content": "x", "turn": 1}),
                parent_id: Some("evt_missing"),
            })
            .unwrap_err();
        assert!(matches!(err, EventStoreError::ParentNotFound(_)));
    }

    #[test]
    fn append_to_ended_session_fails() {
        let store = setup();
        let cr = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        store.end_session(&cr.session.id, "completed").unwrap();

        let err = store.append(&user_msg(&cr.session.id, "too late")).unwrap_err();
        assert!(matches!(err, EventStoreError::SessionEnded(_)));
    }

    #[test]
    fn append_multiple_chains_atomically() {
        let store = setup();
        let cr = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let sid = &cr.session.id;

        let events = store
            .append_multiple(
                sid,
                &[
                    (
                        EventType::CompactBoundary,
                        serde_json::json!({"tokensRemoved": 100, "messagesRemoved": 4, "trigger": "threshold"}),
                    ),
                    (
                        EventType::CompactSummary,
                        serde_json::json!({"summary": "Earlier discussion."}),
                    ),
                ],
            )
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].parent_id.as_deref(), Some(cr.root_event.id.as_str()));
        assert_eq!(events[1].parent_id.as_deref(), Some(events[0].id.as_str()));
        assert_eq!(events[0].sequence + 1, events[1].sequence);

        let session = store.get_session(sid).unwrap().unwrap();
        assert_eq!(session.head_event_id.as_deref(), Some(events[1].id.as_str()));
        assert_eq!(session.event_count, 3);
    }

    #[test]
    fn append_multiple_empty_is_noop() {
        let store = setup();
        let cr = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let events = store.append_multiple(&cr.session.id, &[]).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn model_switch_updates_cached_model() {
        let store = setup();
        let cr = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        store
            .append(&AppendOptions {
                session_id: &cr.session.id,
                event_type: EventType::ConfigModelSwitch,
                payload: serde_json::json!({
                    "previousModel": "claude-sonnet-4-5",
                    "newModel": "gemini-2.5-pro",
                }),
                parent_id: None,
            })
            .unwrap();

        let session = store.get_session(&cr.session.id).unwrap().unwrap();
        assert_eq!(session.latest_model, "gemini-2.5-pro");
    }

    // ── Tree operations ───────────────────────────────────────────────

    #[test]
    fn get_ancestors_walks_to_root() {
        let store = setup();
        let cr = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let sid = &cr.session.id;

        let e1 = store.append(&user_msg(sid, "a")).unwrap();
        let e2 = store.append(&user_msg(sid, "b")).unwrap();

        let ancestors = store.get_ancestors(&e2.id).unwrap();
        assert_eq!(ancestors.len(), 3);
        assert_eq!(ancestors[0].id, cr.root_event.id);
        assert_eq!(ancestors[1].id, e1.id);
        assert_eq!(ancestors[2].id, e2.id);
    }

    // ── Fork ──────────────────────────────────────────────────────────

    #[test]
    fn fork_inherits_ancestors() {
        let store = setup();
        let cr = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let user = store.append(&user_msg(&cr.session.id, "Hello")).unwrap();

        let fork = store.fork(&user.id, &ForkOptions::default()).unwrap();
        assert_ne!(fork.session.id, cr.session.id);
        assert_eq!(
            fork.session.parent_session_id.as_deref(),
            Some(cr.session.id.as_str())
        );
        assert_eq!(
            fork.session.fork_from_event_id.as_deref(),
            Some(user.id.as_str())
        );
        assert_eq!(fork.fork_event.event_type, "session.fork");
        assert_eq!(fork.fork_event.parent_id.as_deref(), Some(user.id.as_str()));
        assert_eq!(fork.fork_event.sequence, 0);

        let ancestors = store.get_ancestors(&fork.fork_event.id).unwrap();
        assert_eq!(ancestors.len(), 3);
        assert_eq!(ancestors[0].id, cr.root_event.id);
    }

    #[test]
    fn fork_does_not_change_source_ancestry() {
        let store = setup();
        let cr = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let user = store.append(&user_msg(&cr.session.id, "Hello")).unwrap();

        let before = store.get_ancestors(&user.id).unwrap();
        let _fork = store.fork(&user.id, &ForkOptions::default()).unwrap();
        let after = store.get_ancestors(&user.id).unwrap();

        let ids_before: Vec<_> = before.iter().map(|e| e.id.clone()).collect();
        let ids_after: Vec<_> = after.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids_before, ids_after);
    }

    #[test]
    fn fork_diverges_from_source() {
        let store = setup();
        let cr = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let sid = &cr.session.id;
        let user = store.append(&user_msg(sid, "Hello")).unwrap();
        let original_reply = store
            .append(&AppendOptions {
                session_id: sid,
                event_type: EventType::MessageAssistant,
                payload: serde_json::json!({"content": [{"type": "text", "text": "World"}], "turn": 1}),
                parent_id: None,
            })
            .unwrap();

        let fork = store.fork(&user.id, &ForkOptions::default()).unwrap();
        let fork_reply = store
            .append(&AppendOptions {
                session_id: &fork.session.id,
                event_type: EventType::MessageAssistant,
                payload: serde_json::json!({"content": [{"type": "text", "text": "Alt"}], "turn": 1}),
                parent_id: None,
            })
            .unwrap();

        let fork_ancestors = store.get_ancestors(&fork_reply.id).unwrap();
        assert!(fork_ancestors.iter().all(|e| e.id != original_reply.id));

        let original_events = store
            .get_events_by_session(sid, ListEventsOptions::default())
            .unwrap();
        assert_eq!(original_events.len(), 3);
    }

    #[test]
    fn fork_head_state_equals_fork_point_state() {
        let store = setup();
        let cr = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let sid = &cr.session.id;
        store.append(&user_msg(sid, "Hello")).unwrap();
        let tip = store
            .append(&AppendOptions {
                session_id: sid,
                event_type: EventType::MessageAssistant,
                payload: serde_json::json!({
                    "content": [{"type": "text", "text": "World"}],
                    "turn": 1,
                    "tokenUsage": {"inputTokens": 11, "outputTokens": 4},
                }),
                parent_id: None,
            })
            .unwrap();

        let fork = store.fork(&tip.id, &ForkOptions::default()).unwrap();
        let at_fork_point = store.get_state_at(&tip.id).unwrap();
        let at_fork_head = store.get_state_at_head(&fork.session.id).unwrap();

        assert_eq!(at_fork_head.messages, at_fork_point.messages);
        assert_eq!(at_fork_head.token_usage, at_fork_point.token_usage);
        assert_eq!(at_fork_head.model, at_fork_point.model);
    }

    #[test]
    fn fork_missing_event_fails() {
        let store = setup();
        let err = store.fork("evt_missing", &ForkOptions::default()).unwrap_err();
        assert!(matches!(err, EventStoreError::EventNotFound(_)));
    }

    // ── Message deletion ──────────────────────────────────────────────

    #[test]
    fn delete_message_appends_tombstone() {
        let store = setup();
        let cr = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let user = store.append(&user_msg(&cr.session.id, "Delete me")).unwrap();

        let deleted = store.delete_message(&cr.session.id, &user.id).unwrap();
        assert_eq!(deleted.event_type, "message.deleted");
        assert!(deleted.sequence > user.sequence);
        let payload: Value = serde_json::from_str(&deleted.payload).unwrap();
        assert_eq!(payload["targetEventId"], user.id);
        assert_eq!(payload["targetType"], "message.user");
    }

    #[test]
    fn delete_message_is_idempotent_in_projection() {
        let store = setup();
        let cr = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let user = store.append(&user_msg(&cr.session.id, "Delete me")).unwrap();

        store.delete_message(&cr.session.id, &user.id).unwrap();
        let second = store.delete_message(&cr.session.id, &user.id).unwrap();
        assert_eq!(second.event_type, "message.deleted");

        let state = store.get_state_at_head(&cr.session.id).unwrap();
        assert!(state.messages.is_empty());
    }

    #[test]
    fn delete_non_message_fails() {
        let store = setup();
        let cr = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let err = store
            .delete_message(&cr.session.id, &cr.root_event.id)
            .unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidOperation(_)));
    }

    // ── Projection through the store ──────────────────────────────────

    #[test]
    fn state_at_head_empty_session() {
        let store = setup();
        let cr = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let state = store.get_state_at_head(&cr.session.id).unwrap();
        assert!(state.messages.is_empty());
        assert_eq!(state.model, "claude-sonnet-4-5");
        assert_eq!(state.token_usage.input_tokens, 0);
    }

    #[test]
    fn state_matches_fold_of_ancestors() {
        let store = setup();
        let cr = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let sid = &cr.session.id;
        store.append(&user_msg(sid, "Hi")).unwrap();
        let head = store
            .append(&AppendOptions {
                session_id: sid,
                event_type: EventType::MessageAssistant,
                payload: serde_json::json!({
                    "content": [{"type": "text", "text": "Hello"}],
                    "turn": 1,
                    "tokenUsage": {"inputTokens": 7, "outputTokens": 3},
                }),
                parent_id: None,
            })
            .unwrap();

        let via_store = store.get_state_at(&head.id).unwrap();
        let ancestors: Vec<SessionEvent> = store
            .get_ancestors(&head.id)
            .unwrap()
            .into_iter()
            .map(|r| r.into_session_event().unwrap())
            .collect();
        let via_fold = project_state(&ancestors);
        assert_eq!(via_store, via_fold);
    }

    // S2 — deletion is visible through a fork.
    #[test]
    fn deletion_visible_through_fork() {
        let store = setup();
        let cr = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let sid = &cr.session.id;
        let u1 = store.append(&user_msg(sid, "U1")).unwrap();
        store
            .append(&AppendOptions {
                session_id: sid,
                event_type: EventType::MessageAssistant,
                payload: serde_json::json!({"content": [{"type": "text", "text": "A1"}], "turn": 1}),
                parent_id: None,
            })
            .unwrap();
        let delete = store.delete_message(sid, &u1.id).unwrap();

        let fork = store.fork(&delete.id, &ForkOptions::default()).unwrap();
        let state = store.get_state_at_head(&fork.session.id).unwrap();
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].message.role, "assistant");
    }

    // ── Session end ───────────────────────────────────────────────────

    #[test]
    fn end_session_flips_flag_and_appends_event() {
        let store = setup();
        let cr = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let end = store.end_session(&cr.session.id, "aborted").unwrap();
        assert_eq!(end.event_type, "session.end");

        let session = store.get_session(&cr.session.id).unwrap().unwrap();
        assert!(!session.is_active());

        let events = store
            .get_events_by_session(&cr.session.id, ListEventsOptions::default())
            .unwrap();
        assert_eq!(events.last().unwrap().event_type, "session.end");
    }

    // ── Listing & search ──────────────────────────────────────────────

    #[test]
    fn list_sessions_filters() {
        let store = setup();
        let a = store
            .create_session("/tmp/a", "/tmp/a", "claude-sonnet-4-5", None)
            .unwrap();
        let _b = store
            .create_session("/tmp/b", "/tmp/b", "claude-sonnet-4-5", None)
            .unwrap();
        store.end_session(&a.session.id, "completed").unwrap();

        let all = store.list_sessions(ListSessionsOptions::default()).unwrap();
        assert_eq!(all.len(), 2);

        let active = store
            .list_sessions(ListSessionsOptions {
                is_active: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(active.len(), 1);

        let ws = store.get_workspace_by_path("/tmp/a").unwrap().unwrap();
        let in_ws = store
            .list_sessions(ListSessionsOptions {
                workspace_id: Some(&ws.id),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(in_ws.len(), 1);
    }

    #[test]
    fn search_finds_appended_content() {
        let store = setup();
        let cr = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        store
            .append(&user_msg(&cr.session.id, "rust event sourcing"))
            .unwrap();

        let results = store.search("sourcing", SearchOptions::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].session_id, cr.session.id);
    }

    #[test]
    fn rebuild_index_roundtrip() {
        let store = setup();
        let cr = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        store.append(&user_msg(&cr.session.id, "needle")).unwrap();

        let reindexed = store.rebuild_session_index(&cr.session.id).unwrap();
        assert_eq!(reindexed, 2); // session.start + message
        assert_eq!(store.search("needle", SearchOptions::default()).unwrap().len(), 1);
    }

    // ── Blobs ─────────────────────────────────────────────────────────

    #[test]
    fn blob_storage_roundtrip() {
        let store = setup();
        let id = store.store_blob(b"large payload", "text/plain").unwrap();
        assert_eq!(
            store.get_blob_content(&id).unwrap().unwrap(),
            b"large payload"
        );
    }
}
