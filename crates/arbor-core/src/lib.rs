//! # arbor-core
//!
//! Shared primitives for the arbor session server:
//!
//! - **Branded IDs**: newtype wrappers with wire prefixes (`ws_`, `sess_`, `evt_`, `blob_`)
//! - **Content blocks**: user / assistant / tool-result block types
//! - **Messages**: the conversation model passed to LLM providers
//! - **Reasoning levels**: discrete effort settings carried in session state
//! - **RPC errors**: machine-readable error codes for the gateway

#![deny(unsafe_code)]

pub mod content;
pub mod errors;
pub mod ids;
pub mod messages;
pub mod reasoning;

pub use content::{AssistantContent, ToolResultContent, UserContent};
pub use errors::{RpcError, RpcErrorCode};
pub use ids::{BlobId, EventId, SessionId, WorkspaceId};
pub use messages::{
    Message, StopReason, TokenUsage, ToolCall, ToolDefinition, ToolResultMessageContent,
    TurnContext, UserMessageContent,
};
pub use reasoning::ReasoningLevel;
