//! Tracing setup for applications embedding the engine

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "signal_automation=info";

/// Install a formatting subscriber.
///
/// Honors `RUST_LOG` and falls back to `default_filter`. Returns false if a
/// global subscriber was already installed by the host application.
pub fn init(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Subscriber for tests: captured output, debug level for this crate
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("signal_automation=debug"))
        .with_test_writer()
        .try_init();
}
