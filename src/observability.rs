//! Structured logging setup.

use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global `tracing` subscriber. `json` selects
/// newline-delimited JSON output (suitable for log aggregation); otherwise
/// a human-readable format is used. The filter defaults to `info` and
/// respects `RUST_LOG` when set.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true);

    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
