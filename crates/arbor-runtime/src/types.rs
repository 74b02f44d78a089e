//! Runtime types: turn phases, outcomes, and the tool dispatch seam.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use arbor_core::{StopReason, TokenUsage, ToolCall, ToolDefinition};

/// Phases of the turn state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnPhase {
    /// No turn in flight.
    Idle,
    /// Persisting the user message.
    AppendingUser,
    /// Consuming the provider stream.
    Streaming,
    /// Dispatching tools / finishing the turn.
    Draining,
    /// The turn failed; a `turn.failed` event has been appended.
    Failed,
}

/// Result of one [`run_turn`](crate::TurnOrchestrator::run_turn) call.
#[derive(Clone, Debug, Default)]
pub struct TurnOutcome {
    /// Turn number this outcome belongs to.
    pub turn: i64,
    /// Whether the turn completed without failure.
    pub success: bool,
    /// Whether the turn was cancelled mid-flight.
    pub interrupted: bool,
    /// Final provider stop reason, when one was reached.
    pub stop_reason: Option<StopReason>,
    /// Token usage summed over the turn's provider rounds.
    pub token_usage: Option<TokenUsage>,
    /// Tool calls executed during the turn.
    pub tool_calls_executed: usize,
    /// Error description for failed turns.
    pub error: Option<String>,
    /// Whether a failed turn may be retried.
    pub recoverable: bool,
}

/// Result of executing one tool call.
#[derive(Clone, Debug)]
pub struct ToolOutcome {
    /// Textual result handed back to the model.
    pub content: String,
    /// Whether the tool execution errored. Tool failure is not fatal to the
    /// turn; the assistant sees the flagged result and reacts.
    pub is_error: bool,
}

/// External tool execution seam.
///
/// Tool hosting is an external collaborator; the orchestrator only needs to
/// advertise definitions and dispatch calls.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Definitions advertised to the provider.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Execute one tool call.
    async fn dispatch(&self, call: &ToolCall, cancel: &CancellationToken) -> ToolOutcome;
}
