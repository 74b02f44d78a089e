//! # arbor-logging
//!
//! Structured logging with `tracing`. One call at process start wires the
//! subscriber; every crate then logs through the `tracing` macros with
//! structured fields (session_id, turn, sequence).

#![deny(unsafe_code)]

use tracing_subscriber::EnvFilter;

/// Output format for log lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, for interactive runs.
    Pretty,
    /// JSON lines, for collection.
    Json,
}

/// Initialise the global subscriber.
///
/// The filter comes from `RUST_LOG` when set, falling back to the given
/// default directive (e.g. `"info"` or `"arbor=debug,info"`). Calling this
/// twice is a no-op: the second registration fails quietly rather than
/// panicking, which keeps tests that race on initialisation harmless.
pub fn init(default_directive: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    // Already initialised (tests, embedding); keep the existing subscriber.
    drop(result);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init("info", LogFormat::Pretty);
        init("debug", LogFormat::Json);
        tracing::info!("still alive after double init");
    }
}
