//! Tracing subscriber setup for embedding applications.

use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber. `RUST_LOG` wins when set;
/// otherwise `default_filter` (e.g. `"mailscan=info"`) applies. Safe to call
/// more than once; later calls are no-ops.
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
