//! # arbor-llm
//!
//! Provider abstraction for the arbor runtime. Concrete wire clients live
//! outside this workspace; this crate defines the contract every provider
//! adapter implements:
//!
//! - [`Provider`]: one `stream(context)` method returning a finite,
//!   non-restartable stream of [`ProviderEvent`]s
//! - [`ProviderError`]: error taxonomy with retryability classification
//! - the static model registry: provider detection, context-window sizes,
//!   and cost rates
//! - token-usage normalisation onto the internal [`TokenUsage`] shape

#![deny(unsafe_code)]

pub mod models;
pub mod normalize;
pub mod provider;

pub use models::{ModelInfo, ProviderKind, context_window, detect_provider, lookup_model};
pub use normalize::{RawUsage, normalize_usage};
pub use provider::{
    CompletedMessage, Provider, ProviderError, ProviderEvent, ProviderEventStream,
    ProviderFactory, ProviderResult,
};
