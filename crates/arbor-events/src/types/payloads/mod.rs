//! Typed payload structs, one module per event domain.
//!
//! Payloads are persisted as opaque JSON on the event row; these structs give
//! compile-time-safe access via [`SessionEvent::typed_payload`]
//! (crate::types::base::SessionEvent::typed_payload).

pub mod compact;
pub mod config;
pub mod error;
pub mod message;
pub mod notification;
pub mod session;
pub mod streaming;
pub mod tool;
pub mod turn;
