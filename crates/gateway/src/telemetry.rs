//! Tracing initialization from the log config.

use tracing_subscriber::EnvFilter;

use conclave_config::{LogConfig, LogFormat};

/// Install the global subscriber. `RUST_LOG` wins over the configured
/// level. Safe to call more than once; later calls are no-ops.
pub fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
    };
    // Already initialized (tests, embedders): keep the existing subscriber.
    drop(result);
}
