//! # arbor-context
//!
//! The in-memory context window for one session: the current message list,
//! deterministic token accounting, discrete threshold levels, and the
//! compaction trigger fired when a model switch shrinks the window.

#![deny(unsafe_code)]

pub mod estimator;
pub mod manager;

pub use estimator::{CHARS_PER_TOKEN, estimate_message_tokens, estimate_messages_tokens, estimate_text_tokens};
pub use manager::{ContextManager, ContextSnapshot, ThresholdLevel};
