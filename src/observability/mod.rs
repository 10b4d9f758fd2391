//! Tracing and logging initialisation.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber.
///
/// Honours `RUST_LOG`; defaults to `info` for the crate and `warn` for
/// dependencies. Safe to call more than once (later calls are no-ops), which
/// keeps test binaries happy.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,swift_signals=info"));

    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
