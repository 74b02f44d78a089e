//! Central context manager.
//!
//! [`ContextManager`] is the orchestrator's in-memory view of one session:
//! the current message list, the model and its context-window limit, cached
//! token usage, and the discrete threshold level. A model switch preserves
//! the messages verbatim and, when the new level crosses into alert or
//! exceeded, fires the registered compaction callback exactly once.

use tracing::debug;

use arbor_core::Message;
use arbor_llm::models::{ProviderKind, context_window, detect_provider};

use crate::estimator::{estimate_message_tokens, estimate_messages_tokens};

/// Discrete classification of context-window fullness.
///
/// Thresholds: warning at 0.60, alert at 0.80, exceeded at 1.0 of the
/// window; 0.95 is the critical boundary inside alert that pre-turn
/// validation treats as "compact before accepting more input".
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ThresholdLevel {
    /// Under 60% of the window.
    Normal,
    /// 60% – 80%.
    Warning,
    /// 80% – 100%.
    Alert,
    /// At or past the window limit.
    Exceeded,
}

/// Warning threshold ratio.
pub const WARNING_RATIO: f64 = 0.60;
/// Alert threshold ratio.
pub const ALERT_RATIO: f64 = 0.80;
/// Critical ratio used by pre-turn validation.
pub const CRITICAL_RATIO: f64 = 0.95;

impl ThresholdLevel {
    /// Classify a usage ratio.
    #[must_use]
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 1.0 {
            Self::Exceeded
        } else if ratio >= ALERT_RATIO {
            Self::Alert
        } else if ratio >= WARNING_RATIO {
            Self::Warning
        } else {
            Self::Normal
        }
    }

    /// Wire string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Alert => "alert",
            Self::Exceeded => "exceeded",
        }
    }
}

/// Snapshot of the context manager's state.
#[derive(Clone, Debug)]
pub struct ContextSnapshot {
    /// The current message list.
    pub messages: Vec<Message>,
    /// Estimated tokens in the window.
    pub current_tokens: u64,
    /// `current_tokens / context_limit`.
    pub usage_percent: f64,
    /// Discrete fullness level.
    pub threshold_level: ThresholdLevel,
    /// Current model ID.
    pub model: String,
    /// Provider serving the model, when known.
    pub provider_kind: Option<ProviderKind>,
    /// Context-window limit in tokens.
    pub context_limit: u64,
}

/// In-memory context window for one session.
pub struct ContextManager {
    messages: Vec<Message>,
    working_directory: String,
    model: String,
    context_limit: u64,
    current_tokens: u64,
    on_compaction_needed: Option<Box<dyn Fn() + Send + Sync>>,
}

impl ContextManager {
    /// Create a manager for a model, deriving the window limit from the
    /// model registry.
    #[must_use]
    pub fn new(model: impl Into<String>, working_directory: impl Into<String>) -> Self {
        let model = model.into();
        let context_limit = context_window(&model);
        Self {
            messages: Vec::new(),
            working_directory: working_directory.into(),
            model,
            context_limit,
            current_tokens: 0,
            on_compaction_needed: None,
        }
    }

    // ── Messages ────────────────────────────────────────────────────────

    /// Append a message and recompute token usage.
    pub fn add_message(&mut self, message: Message) {
        self.current_tokens += estimate_message_tokens(&message);
        self.messages.push(message);
    }

    /// Replace the whole message list (session resume) and recompute.
    pub fn set_messages(&mut self, messages: Vec<Message>) {
        self.current_tokens = estimate_messages_tokens(&messages);
        self.messages = messages;
    }

    /// Remove all messages.
    pub fn clear_messages(&mut self) {
        self.messages.clear();
        self.current_tokens = 0;
    }

    /// The current messages.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages in the window.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    // ── Accessors ───────────────────────────────────────────────────────

    /// Current model ID.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Working directory.
    #[must_use]
    pub fn working_directory(&self) -> &str {
        &self.working_directory
    }

    /// Context-window limit in tokens.
    #[must_use]
    pub fn context_limit(&self) -> u64 {
        self.context_limit
    }

    /// Estimated tokens currently in the window.
    #[must_use]
    pub fn current_tokens(&self) -> u64 {
        self.current_tokens
    }

    /// Fraction of the window in use.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn usage_percent(&self) -> f64 {
        if self.context_limit == 0 {
            return 0.0;
        }
        self.current_tokens as f64 / self.context_limit as f64
    }

    /// Current threshold level.
    #[must_use]
    pub fn threshold_level(&self) -> ThresholdLevel {
        ThresholdLevel::from_ratio(self.usage_percent())
    }

    // ── Model switching ─────────────────────────────────────────────────

    /// Switch to a new model.
    ///
    /// Messages are preserved verbatim; the window limit comes from the
    /// registry. If the switch pushes the threshold level up into alert or
    /// exceeded, the registered compaction callback fires exactly once.
    /// Switching to a larger window can only lower the level, so it never
    /// fires.
    pub fn switch_model(&mut self, new_model: impl Into<String>) {
        let new_model = new_model.into();
        let previous_level = self.threshold_level();

        self.model = new_model;
        self.context_limit = context_window(&self.model);

        let new_level = self.threshold_level();
        debug!(
            model = %self.model,
            context_limit = self.context_limit,
            level = new_level.as_str(),
            "model switched"
        );

        if new_level > previous_level && new_level >= ThresholdLevel::Alert {
            if let Some(cb) = &self.on_compaction_needed {
                cb();
            }
        }
    }

    /// Register the compaction callback. A later registration replaces the
    /// earlier one.
    pub fn on_compaction_needed(&mut self, callback: impl Fn() + Send + Sync + 'static) {
        self.on_compaction_needed = Some(Box::new(callback));
    }

    // ── Snapshot ────────────────────────────────────────────────────────

    /// Snapshot the current state.
    #[must_use]
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            messages: self.messages.clone(),
            current_tokens: self.current_tokens,
            usage_percent: self.usage_percent(),
            threshold_level: self.threshold_level(),
            model: self.model.clone(),
            provider_kind: detect_provider(&self.model),
            context_limit: self.context_limit,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn threshold_level_from_ratio() {
        assert_eq!(ThresholdLevel::from_ratio(0.0), ThresholdLevel::Normal);
        assert_eq!(ThresholdLevel::from_ratio(0.59), ThresholdLevel::Normal);
        assert_eq!(ThresholdLevel::from_ratio(0.60), ThresholdLevel::Warning);
        assert_eq!(ThresholdLevel::from_ratio(0.79), ThresholdLevel::Warning);
        assert_eq!(ThresholdLevel::from_ratio(0.80), ThresholdLevel::Alert);
        assert_eq!(ThresholdLevel::from_ratio(0.99), ThresholdLevel::Alert);
        assert_eq!(ThresholdLevel::from_ratio(1.0), ThresholdLevel::Exceeded);
        assert_eq!(ThresholdLevel::from_ratio(1.5), ThresholdLevel::Exceeded);
    }

    #[test]
    fn threshold_levels_are_ordered() {
        assert!(ThresholdLevel::Normal < ThresholdLevel::Warning);
        assert!(ThresholdLevel::Warning < ThresholdLevel::Alert);
        assert!(ThresholdLevel::Alert < ThresholdLevel::Exceeded);
    }

    #[test]
    fn new_manager_uses_registry_limit() {
        let cm = ContextManager::new("gemini-2.5-pro", "/p");
        assert_eq!(cm.context_limit(), 1_000_000);
        assert_eq!(cm.current_tokens(), 0);
        assert_eq!(cm.threshold_level(), ThresholdLevel::Normal);
    }

    #[test]
    fn add_message_updates_tokens() {
        let mut cm = ContextManager::new("claude-sonnet-4-5", "/p");
        cm.add_message(Message::user("hello"));
        assert!(cm.current_tokens() > 0);
        assert_eq!(cm.message_count(), 1);
    }

    #[test]
    fn set_messages_recomputes() {
        let mut cm = ContextManager::new("claude-sonnet-4-5", "/p");
        cm.add_message(Message::user("a"));
        let msgs = vec![Message::user("hello"), Message::assistant("hi")];
        let expected = estimate_messages_tokens(&msgs);
        cm.set_messages(msgs);
        assert_eq!(cm.current_tokens(), expected);
        assert_eq!(cm.message_count(), 2);
    }

    // S3 — model-switch compaction trigger.
    #[test]
    fn shrinking_switch_fires_compaction_once() {
        let mut cm = ContextManager::new("gemini-2.5-pro", "/p");
        // ≈ 300k tokens in a 1M window — level is normal.
        cm.add_message(Message::user(&"a".repeat(1_200_000)));
        assert_eq!(cm.threshold_level(), ThresholdLevel::Normal);

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        cm.on_compaction_needed(move || {
            let _ = fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        // 300k tokens in a 200k window — exceeded.
        cm.switch_model("claude-sonnet-4-5");
        assert_eq!(cm.threshold_level(), ThresholdLevel::Exceeded);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(cm.message_count(), 1);
    }

    #[test]
    fn growing_switch_never_fires() {
        let mut cm = ContextManager::new("claude-sonnet-4-5", "/p");
        // ≈ 170k tokens in a 200k window — alert.
        cm.add_message(Message::user(&"a".repeat(680_000)));
        assert_eq!(cm.threshold_level(), ThresholdLevel::Alert);

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        cm.on_compaction_needed(move || {
            let _ = fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        cm.switch_model("gemini-2.5-pro");
        assert_eq!(cm.threshold_level(), ThresholdLevel::Normal);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn switch_within_same_level_does_not_fire() {
        let mut cm = ContextManager::new("claude-sonnet-4-5", "/p");
        cm.add_message(Message::user("tiny"));

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        cm.on_compaction_needed(move || {
            let _ = fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        cm.switch_model("claude-haiku-4-5");
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn switch_preserves_messages_verbatim() {
        let mut cm = ContextManager::new("claude-sonnet-4-5", "/p");
        cm.add_message(Message::user("keep me"));
        let before = cm.messages().to_vec();
        cm.switch_model("gemini-2.5-flash");
        assert_eq!(cm.messages(), before.as_slice());
    }

    #[test]
    fn switch_back_and_forth_restores_token_totals() {
        let mut cm = ContextManager::new("claude-sonnet-4-5", "/p");
        cm.add_message(Message::user("stable content"));
        let before = cm.current_tokens();
        cm.switch_model("gemini-2.5-pro");
        cm.switch_model("claude-sonnet-4-5");
        assert_eq!(cm.current_tokens(), before);
        assert_eq!(cm.context_limit(), 200_000);
    }

    #[test]
    fn snapshot_reflects_state() {
        let mut cm = ContextManager::new("claude-sonnet-4-5", "/proj");
        cm.add_message(Message::user("hello"));
        let snap = cm.snapshot();
        assert_eq!(snap.model, "claude-sonnet-4-5");
        assert_eq!(snap.provider_kind, Some(ProviderKind::Anthropic));
        assert_eq!(snap.context_limit, 200_000);
        assert_eq!(snap.messages.len(), 1);
        assert_eq!(snap.current_tokens, cm.current_tokens());
        assert_eq!(snap.threshold_level, ThresholdLevel::Normal);
    }

    #[test]
    fn usage_percent_zero_limit_is_zero() {
        let mut cm = ContextManager::new("claude-sonnet-4-5", "/p");
        cm.context_limit = 0;
        assert!((cm.usage_percent() - 0.0).abs() < f64::EPSILON);
    }
}
