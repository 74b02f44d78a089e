//! # arbor-rpc
//!
//! The RPC surface of the session server: request/response envelopes, the
//! method registry, and the handlers for session, event, message, and turn
//! methods. Transport (WebSocket framing) lives in `arbor-server`; this
//! crate is transport-agnostic.

#![deny(unsafe_code)]

pub mod context;
pub mod handlers;
pub mod registry;
pub mod types;

pub use context::RpcContext;
pub use registry::dispatch;
pub use types::{RpcErrorBody, RpcRequest, RpcResponse};
