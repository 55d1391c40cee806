//! `tracing` subscriber setup for the binary. The library only emits events.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

/// Install a formatting subscriber. `RUST_LOG` wins over `settings.filter`.
///
/// Calling it again once a subscriber is installed does nothing.
pub fn init(settings: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
