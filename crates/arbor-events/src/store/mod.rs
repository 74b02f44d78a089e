//! High-level event store API.

pub mod event_store;

pub use event_store::{AppendOptions, CreateSessionResult, EventStore, ForkOptions, ForkResult};
