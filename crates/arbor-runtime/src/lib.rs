//! # arbor-runtime
//!
//! The turn machinery that sits between the RPC gateway and the event store:
//!
//! - [`EventPersister`]: per-session single-writer queue that linearises
//!   appends and latches on the first failure
//! - [`NotificationBus`]: session-scoped pub/sub with bounded, drop-oldest
//!   subscriber queues
//! - [`TurnOrchestrator`]: the idle → appending_user → streaming → draining
//!   state machine that drives a provider stream into persisted events
//! - [`SessionManager`]: live-session registry and resume

#![deny(unsafe_code)]

pub mod bus;
pub mod errors;
pub mod orchestrator;
pub mod persister;
pub mod session;
pub mod stream_processor;
pub mod types;

pub use bus::{BusEvent, Delivery, NotificationBus, Subscription};
pub use errors::RuntimeError;
pub use orchestrator::TurnOrchestrator;
pub use persister::EventPersister;
pub use session::{ResumedSession, SessionManager, to_messages, to_turn_context};
pub use stream_processor::{ProviderFault, StreamOutcome, process_stream};
pub use types::{ToolDispatcher, ToolOutcome, TurnOutcome, TurnPhase};
