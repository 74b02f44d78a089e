//! # arbor-server
//!
//! The WebSocket gateway over the RPC surface: environment configuration,
//! per-connection state, session-scoped event fan-out, and the axum router.

#![deny(unsafe_code)]

pub mod config;
pub mod server;
pub mod websocket;

pub use config::{ConfigError, ServerConfig};
pub use server::{AppState, build_router};
