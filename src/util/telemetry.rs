//! Telemetry helpers for structured logging and tracing.

use tracing_subscriber::EnvFilter;

/// Initialize tracing for the scheduling core. Embedders can install their
/// own subscriber first; this helper only installs an env-based default if
/// nothing is set. Without `RUST_LOG` the crate logs at `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fetcharr_core=info"));
    // try_init keeps an embedder-installed subscriber in place.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
