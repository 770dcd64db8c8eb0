//! Logging setup.
//!
//! The library crates only emit `tracing` events; installing a subscriber
//! is the application's call, made once at startup.

use tracing_subscriber::EnvFilter;

/// Installs a formatted `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` (for example
/// [`Config::log_filter`](crate::Config::log_filter)) is used. Calling this
/// twice is harmless: the second call leaves the first subscriber in place
/// and returns `false`.
pub fn init(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
