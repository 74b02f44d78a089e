//! Token-usage normalisation.
//!
//! Provider APIs disagree about cache accounting: some report cache reads
//! and writes separately, some fold them into input tokens, some omit them
//! entirely. Adapters call [`normalize_usage`] so that everything downstream
//! (persistence, projection, the context manager) sees one shape, with cache
//! fields defaulting to zero when the provider does not expose them.

use arbor_core::TokenUsage;

use crate::models::ProviderKind;

/// Raw usage figures as reported by a provider, before normalisation.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawUsage {
    /// Input tokens as reported.
    pub input_tokens: u64,
    /// Output tokens as reported.
    pub output_tokens: u64,
    /// Cache-read tokens, if the provider reports them.
    pub cache_read_tokens: Option<u64>,
    /// Cache-creation tokens, if the provider reports them.
    pub cache_creation_tokens: Option<u64>,
}

/// Map provider-reported usage onto the internal [`TokenUsage`] shape.
///
/// Missing cache figures become `Some(0)` so that accumulation code never
/// has to distinguish "absent" from "zero".
#[must_use]
pub fn normalize_usage(kind: ProviderKind, raw: RawUsage) -> TokenUsage {
    // Every provider currently maps 1:1 onto the internal fields; the kind
    // parameter is part of the contract so adapters with folded cache
    // accounting can diverge without changing call sites.
    let _ = kind;
    TokenUsage {
        input_tokens: raw.input_tokens,
        output_tokens: raw.output_tokens,
        cache_read_tokens: Some(raw.cache_read_tokens.unwrap_or(0)),
        cache_creation_tokens: Some(raw.cache_creation_tokens.unwrap_or(0)),
    }
}
