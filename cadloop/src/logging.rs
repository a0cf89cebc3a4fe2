//! Structured tracing for cadloop.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: loop diagnostics keyed by `component`,
//!   `iteration`/`attempt` and `stage`, filtered by `RUST_LOG`, written to stderr.
//!
//! - **Run history (`io/history`)**: product artifacts under the output
//!   directory. Always written, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; falls back to `default_directive` when unset or invalid.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=cadloop=debug cadloop run "a 40mm cube"
/// ```
pub fn init(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
