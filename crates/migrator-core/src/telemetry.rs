//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins over the configured filter. Calling this more than once
/// (or after another subscriber was installed) is a no-op.
pub fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .try_init();

    if result.is_ok() {
        tracing::debug!(filter = %config.filter, "tracing initialized");
    }
}
