//! Event persister — per-session linearised writes with a sticky error latch.
//!
//! The orchestrator produces events faster than the store can durably commit
//! them and would otherwise race on the session head. All appends for a
//! session are serialised through an MPSC channel to a single worker task
//! that threads `parent_id` from the pending head it tracks, guaranteeing a
//! linear chain.
//!
//! After any commit failure the persister latches: awaited appends return
//! `None`, fire-and-forget appends are silently skipped, and no further rows
//! are written. The persister never retries; retries are the caller's
//! decision.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use arbor_events::sqlite::row_types::EventRow;
use arbor_events::{AppendOptions, EventStore, EventType};

use crate::errors::RuntimeError;

/// Callback invoked with the committed row of a fire-and-forget append.
pub type OnCreated = Box<dyn FnOnce(EventRow) + Send>;

enum PersistRequest {
    Append {
        event_type: EventType,
        payload: Value,
        reply: Option<oneshot::Sender<Option<EventRow>>>,
        on_created: Option<OnCreated>,
    },
    AppendMultiple {
        items: Vec<(EventType, Value)>,
        reply: oneshot::Sender<Option<Vec<EventRow>>>,
    },
    Flush {
        reply: oneshot::Sender<()>,
    },
}

struct Shared {
    pending_head: Mutex<Option<String>>,
    error: Mutex<Option<String>>,
}

impl Shared {
    fn latch(&self, message: String) {
        let mut error = self.error.lock();
        if error.is_none() {
            *error = Some(message);
        }
    }
}

/// Per-session single-writer event persister.
pub struct EventPersister {
    session_id: String,
    tx: mpsc::Sender<PersistRequest>,
    shared: Arc<Shared>,
}

impl EventPersister {
    /// Create a persister for one session, seeding the pending head from the
    /// session's current head.
    pub fn new(store: Arc<EventStore>, session_id: impl Into<String>) -> Result<Self, RuntimeError> {
        let session_id = session_id.into();
        let head = store
            .get_session(&session_id)?
            .ok_or_else(|| {
                RuntimeError::Store(arbor_events::EventStoreError::SessionNotFound(
                    session_id.clone(),
                ))
            })?
            .head_event_id;

        let shared = Arc::new(Shared {
            pending_head: Mutex::new(head),
            error: Mutex::new(None),
        });

        let (tx, rx) = mpsc::channel(256);
        let worker_shared = shared.clone();
        let worker_session = session_id.clone();
        let _worker = tokio::spawn(persist_worker(rx, store, worker_session, worker_shared));

        Ok(Self {
            session_id,
            tx,
            shared,
        })
    }

    /// Session this persister writes to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Enqueue an append and await its commit.
    ///
    /// Returns `None` if the persister has latched (now or while the request
    /// was queued).
    pub async fn append_async(&self, event_type: EventType, payload: Value) -> Option<EventRow> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self
            .tx
            .send(PersistRequest::Append {
                event_type,
                payload,
                reply: Some(reply_tx),
                on_created: None,
            })
            .await;
        if sent.is_err() {
            self.shared.latch("persist worker exited".into());
            return None;
        }
        reply_rx.await.unwrap_or(None)
    }

    /// Fire-and-forget append. Silently skipped once latched.
    pub fn append(&self, event_type: EventType, payload: Value) {
        self.append_with_callback(event_type, payload, None);
    }

    /// Fire-and-forget append with a commit callback.
    pub fn append_with(
        &self,
        event_type: EventType,
        payload: Value,
        on_created: impl FnOnce(EventRow) + Send + 'static,
    ) {
        self.append_with_callback(event_type, payload, Some(Box::new(on_created)));
    }

    fn append_with_callback(
        &self,
        event_type: EventType,
        payload: Value,
        on_created: Option<OnCreated>,
    ) {
        let request = PersistRequest::Append {
            event_type: event_type.clone(),
            payload,
            reply: None,
            on_created,
        };
        if let Err(e) = self.tx.try_send(request) {
            warn!(
                session_id = %self.session_id,
                event_type = %event_type,
                error = %e,
                "fire-and-forget persist dropped: channel unavailable"
            );
        }
    }

    /// Atomic multi-append: event *n+1*'s parent is event *n*.
    ///
    /// Returns `None` if the persister has latched.
    pub async fn append_multiple(
        &self,
        items: Vec<(EventType, Value)>,
    ) -> Option<Vec<EventRow>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self
            .tx
            .send(PersistRequest::AppendMultiple {
                items,
                reply: reply_tx,
            })
            .await;
        if sent.is_err() {
            self.shared.latch("persist worker exited".into());
            return None;
        }
        reply_rx.await.unwrap_or(None)
    }

    /// Wait until every previously enqueued operation has committed or
    /// failed.
    pub async fn flush(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(PersistRequest::Flush { reply: reply_tx }).await.is_err() {
            return;
        }
        let _ = reply_rx.await;
    }

    /// The head ID the next enqueued append will chain from.
    #[must_use]
    pub fn pending_head_event_id(&self) -> Option<String> {
        self.shared.pending_head.lock().clone()
    }

    /// Whether a commit failure has latched this persister.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.shared.error.lock().is_some()
    }

    /// The latched error, if any.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.shared.error.lock().clone()
    }
}

/// Background worker draining the queue in FIFO order.
///
/// One logical writer per session: each dequeued append reads the pending
/// head, commits with that parent, and advances the pending head. A failed
/// commit latches the error; subsequent requests are answered without
/// touching the store.
async fn persist_worker(
    mut rx: mpsc::Receiver<PersistRequest>,
    store: Arc<EventStore>,
    session_id: String,
    shared: Arc<Shared>,
) {
    while let Some(request) = rx.recv().await {
        match request {
            PersistRequest::Flush { reply } => {
                let _ = reply.send(());
            }
            PersistRequest::Append {
                event_type,
                payload,
                reply,
                on_created,
            } => {
                if shared.error.lock().is_some() {
                    if let Some(reply) = reply {
                        let _ = reply.send(None);
                    }
                    continue;
                }

                let parent = shared.pending_head.lock().clone();
                let result = store.append(&AppendOptions {
                    session_id: &session_id,
                    event_type: event_type.clone(),
                    payload,
                    parent_id: parent.as_deref(),
                });

                match result {
                    Ok(row) => {
                        *shared.pending_head.lock() = Some(row.id.clone());
                        if let Some(cb) = on_created {
                            cb(row.clone());
                        }
                        if let Some(reply) = reply {
                            let _ = reply.send(Some(row));
                        }
                    }
                    Err(e) => {
                        warn!(
                            session_id,
                            event_type = %event_type,
                            error = %e,
                            "append failed, latching persister"
                        );
                        shared.latch(e.to_string());
                        if let Some(reply) = reply {
                            let _ = reply.send(None);
                        }
                    }
                }
            }
            PersistRequest::AppendMultiple { items, reply } => {
                if shared.error.lock().is_some() {
                    let _ = reply.send(None);
                    continue;
                }

                match store.append_multiple(&session_id, &items) {
                    Ok(rows) => {
                        if let Some(last) = rows.last() {
                            *shared.pending_head.lock() = Some(last.id.clone());
                        }
                        let _ = reply.send(Some(rows));
                    }
                    Err(e) => {
                        warn!(session_id, error = %e, "multi-append failed, latching persister");
                        shared.latch(e.to_string());
                        let _ = reply.send(None);
                    }
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_events::sqlite::repositories::event::ListEventsOptions;
    use arbor_events::{ConnectionConfig, new_in_memory, run_migrations};

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

    fn create_session(store: &Arc<EventStore>) -> String {
        store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap()
            .session
            .id
    }

    #[tokio::test]
    async fn append_async_commits() {
        let store = make_store();
        let sid = create_session(&store);
        let persister = EventPersister::new(store.clone(), &sid).unwrap();

        let row = persister
            .append_async(
                EventType::MessageUser,
                serde_json::json!({"content": "hello", "turn": 1}),
            )
            .await
            .unwrap();
        assert_eq!(row.session_id, sid);
        assert_eq!(row.sequence, 1);
        assert_eq!(persister.pending_head_event_id().as_deref(), Some(row.id.as_str()));
    }

    // S1 — linearisation under rapid append.
    #[tokio::test]
    async fn rapid_fire_appends_form_linear_chain() {
        let store = make_store();
        let sid = create_session(&store);
        let persister = EventPersister::new(store.clone(), &sid).unwrap();

        for i in 0..10 {
            persister.append(
                EventType::MessageUser,
                serde_json::json!({"content": format!("m{i}"), "turn": 1}),
            );
        }
        persister.flush().await;

        let events = store
            .get_events_by_session(&sid, ListEventsOptions::default())
            .unwrap();
        assert_eq!(events.len(), 11); // session.start + ten messages
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.sequence, i as i64);
            if i > 0 {
                assert_eq!(event.parent_id.as_deref(), Some(events[i - 1].id.as_str()));
            }
        }
        assert!(!persister.has_error());
    }

    #[tokio::test]
    async fn append_multiple_is_atomic_pair() {
        let store = make_store();
        let sid = create_session(&store);
        let persister = EventPersister::new(store.clone(), &sid).unwrap();

        let rows = persister
            .append_multiple(vec![
                (
                    EventType::CompactBoundary,
                    serde_json::json!({"tokensRemoved": 9, "messagesRemoved": 1, "trigger": "threshold"}),
                ),
                (
                    EventType::CompactSummary,
                    serde_json::json!({"summary": "s"}),
                ),
            ])
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].parent_id.as_deref(), Some(rows[0].id.as_str()));
        assert_eq!(
            persister.pending_head_event_id().as_deref(),
            Some(rows[1].id.as_str())
        );
    }

    #[tokio::test]
    async fn flush_waits_for_queued_writes() {
        let store = make_store();
        let sid = create_session(&store);
        let persister = EventPersister::new(store.clone(), &sid).unwrap();

        for i in 0..5 {
            persister.append(
                EventType::MessageUser,
                serde_json::json!({"content": format!("msg-{i}"), "turn": 1}),
            );
        }
        persister.flush().await;

        let events = store
            .get_events_by_session(&sid, ListEventsOptions::default())
            .unwrap();
        assert_eq!(events.len(), 6);
    }

    #[tokio::test]
    async fn on_created_callback_sees_committed_row() {
        let store = make_store();
        let sid = create_session(&store);
        let persister = EventPersister::new(store.clone(), &sid).unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel();
        persister.append_with(
            EventType::MessageUser,
            serde_json::json!({"content": "cb", "turn": 1}),
            move |row| {
                let _ = tx.send(row.sequence);
            },
        );
        assert_eq!(rx.await.unwrap(), 1);
    }

    // S6 — persister error latch.
    #[tokio::test]
    async fn commit_failure_latches_and_stops_writing() {
        let store = make_store();
        let sid = create_session(&store);
        let persister = EventPersister::new(store.clone(), &sid).unwrap();

        // Pull the session out from under the persister: further appends
        // are rejected by the store.
        let _ = store.end_session(&sid, "aborted").unwrap();
        let head_after_end = store.get_session(&sid).unwrap().unwrap().head_event_id;

        let result = persister
            .append_async(
                EventType::MessageUser,
                serde_json::json!({"content": "doomed", "turn": 1}),
            )
            .await;
        assert!(result.is_none());
        assert!(persister.has_error());
        assert!(persister.error().unwrap().contains("ended"));

        // Fire-and-forget after the latch is silently skipped.
        persister.append(
            EventType::MessageUser,
            serde_json::json!({"content": "also doomed", "turn": 1}),
        );
        persister.flush().await;

        let head_now = store.get_session(&sid).unwrap().unwrap().head_event_id;
        assert_eq!(head_now, head_after_end);

        // A fresh persister against a healthy session still works.
        let sid2 = create_session(&store);
        let persister2 = EventPersister::new(store.clone(), &sid2).unwrap();
        assert!(
            persister2
                .append_async(
                    EventType::MessageUser,
                    serde_json::json!({"content": "fine", "turn": 1}),
                )
                .await
                .is_some()
        );
        // The latched one stays dead.
        assert!(persister.has_error());
    }

    #[tokio::test]
    async fn awaited_append_after_latch_returns_none_without_write() {
        let store = make_store();
        let sid = create_session(&store);
        let persister = EventPersister::new(store.clone(), &sid).unwrap();
        let _ = store.end_session(&sid, "aborted").unwrap();

        assert!(
            persister
                .append_async(EventType::MessageUser, serde_json::json!({"content": "a", "turn": 1}))
                .await
                .is_none()
        );
        let count_after_first = store
            .get_events_by_session(&sid, ListEventsOptions::default())
            .unwrap()
            .len();

        assert!(
            persister
                .append_async(EventType::MessageUser, serde_json::json!({"content": "b", "turn": 1}))
                .await
                .is_none()
        );
        let count_after_second = store
            .get_events_by_session(&sid, ListEventsOptions::default())
            .unwrap()
            .len();
        assert_eq!(count_after_first, count_after_second);
    }

    #[tokio::test]
    async fn append_multiple_after_latch_returns_none() {
        let store = make_store();
        let sid = create_session(&store);
        let persister = EventPersister::new(store.clone(), &sid).unwrap();
        let _ = store.end_session(&sid, "aborted").unwrap();

        // Latch via a failing single append first.
        let _ = persister
            .append_async(EventType::MessageUser, serde_json::json!({"content": "x", "turn": 1}))
            .await;
        assert!(persister.has_error());

        let result = persister
            .append_multiple(vec![(
                EventType::MessageUser,
                serde_json::json!({"content": "y", "turn": 1}),
            )])
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn missing_session_fails_construction() {
        let store = make_store();
        let result = EventPersister::new(store, "sess_missing");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn pending_head_starts_at_session_head() {
        let store = make_store();
        let created = store
            .create_session("/tmp/p", "/tmp/p", "claude-sonnet-4-5", None)
            .unwrap();
        let persister = EventPersister::new(store, &created.session.id).unwrap();
        assert_eq!(
            persister.pending_head_event_id().as_deref(),
            Some(created.root_event.id.as_str())
        );
    }
}
