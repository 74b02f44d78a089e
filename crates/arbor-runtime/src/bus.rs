//! Notification bus — session-scoped pub/sub for live events.
//!
//! Subscribers register by session ID and receive every event the
//! orchestrator persists, plus transient notifications. Delivery is
//! best-effort and at-most-once per subscriber: each subscriber owns a
//! bounded queue, and overflow drops the oldest queued message, surfaced to
//! the subscriber as a dropped-count delivery rather than blocking the
//! publisher.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Notify;

/// Default per-subscriber queue capacity.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

/// One live event as delivered to subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusEvent {
    /// Event type string (persisted type, or a transient notification).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Session the event belongs to.
    pub session_id: String,
    /// Sequence number for persisted events; `None` for transient ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i64>,
    /// Event payload.
    pub payload: Value,
}

/// What a subscriber receives.
#[derive(Clone, Debug, PartialEq)]
pub enum Delivery {
    /// A live event.
    Event(BusEvent),
    /// `count` messages were dropped ahead of this point because the
    /// subscriber fell behind.
    Dropped {
        /// How many messages were lost.
        count: u64,
    },
}

struct SubscriberState {
    queue: Mutex<VecDeque<BusEvent>>,
    dropped: AtomicU64,
    notify: Notify,
    closed: AtomicBool,
    capacity: usize,
}

/// Process-wide, session-scoped notification bus.
pub struct NotificationBus {
    subscribers: Mutex<HashMap<String, Vec<Arc<SubscriberState>>>>,
    capacity: usize,
}

impl NotificationBus {
    /// Create a bus with the default per-subscriber capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// Create a bus with an explicit per-subscriber queue capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to one session's live events.
    pub fn subscribe(&self, session_id: &str) -> Subscription {
        let state = Arc::new(SubscriberState {
            queue: Mutex::new(VecDeque::new()),
            dropped: AtomicU64::new(0),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            capacity: self.capacity,
        });
        self.subscribers
            .lock()
            .entry(session_id.to_owned())
            .or_default()
            .push(state.clone());
        Subscription { state }
    }

    /// Publish an event to every subscriber of its session.
    ///
    /// Never blocks: a full subscriber queue drops its oldest entry.
    pub fn publish(&self, event: &BusEvent) {
        let mut subscribers = self.subscribers.lock();
        let Some(session_subs) = subscribers.get_mut(&event.session_id) else {
            return;
        };

        session_subs.retain(|s| !s.closed.load(Ordering::Acquire));
        for sub in session_subs.iter() {
            {
                let mut queue = sub.queue.lock();
                if queue.len() >= sub.capacity {
                    let _ = queue.pop_front();
                    let _ = sub.dropped.fetch_add(1, Ordering::AcqRel);
                }
                queue.push_back(event.clone());
            }
            sub.notify.notify_one();
        }
        if session_subs.is_empty() {
            let _ = subscribers.remove(&event.session_id);
        }
    }

    /// Number of live subscribers for a session.
    #[must_use]
    pub fn subscriber_count(&self, session_id: &str) -> usize {
        self.subscribers
            .lock()
            .get(session_id)
            .map_or(0, |subs| {
                subs.iter()
                    .filter(|s| !s.closed.load(Ordering::Acquire))
                    .count()
            })
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscription; dropping it unsubscribes.
pub struct Subscription {
    state: Arc<SubscriberState>,
}

impl Subscription {
    /// Receive the next delivery, waiting if the queue is empty.
    ///
    /// A pending dropped-count is always surfaced before newer events so the
    /// subscriber knows where its gap is.
    pub async fn recv(&mut self) -> Delivery {
        loop {
            if let Some(delivery) = self.try_recv() {
                return delivery;
            }
            self.state.notify.notified().await;
        }
    }

    /// Receive without waiting.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        let dropped = self.state.dropped.swap(0, Ordering::AcqRel);
        if dropped > 0 {
            return Some(Delivery::Dropped { count: dropped });
        }
        self.state
            .queue
            .lock()
            .pop_front()
            .map(Delivery::Event)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.state.closed.store(true, Ordering::Release);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
