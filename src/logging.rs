//! Logging setup.
//!
//! The mapper reports through `tracing`: reconciliation warns when a list
//! element has no usable match key, and the provider logs each dispatched
//! call at debug level. These helpers install a `tracing-subscriber` that
//! writes to **stderr**, since stdout belongs to the host process.
//!
//! # Environment Variables
//!
//! - `FORTIOS_LOG`: filter for this provider (e.g. `debug`, `fortios_mapper=trace`)
//! - `RUST_LOG`: used when `FORTIOS_LOG` is not set
//!
//! ```bash
//! FORTIOS_LOG=fortios_mapper::reconcile=debug ./provider
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable read before `RUST_LOG`.
pub const LOG_ENV: &str = "FORTIOS_LOG";

const DEFAULT_LEVEL: &str = "info";

/// Initialize the global subscriber at the default `info` level.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default(DEFAULT_LEVEL);
}

/// Initialize the global subscriber, falling back to `default_level` when
/// neither environment variable is set.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(stderr_layer())
        .init();
}

/// Try to initialize logging, returning false if a subscriber is already set.
///
/// Useful in tests, where several cases may race to install one.
pub fn try_init_logging() -> bool {
    tracing_subscriber::registry()
        .with(env_filter(DEFAULT_LEVEL))
        .with(stderr_layer())
        .try_init()
        .is_ok()
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
}

#[cfg(test)]
mod tests {
    // The global subscriber can only be set once per process, so only
    // filter construction is checked here.

    use super::*;

    #[test]
    fn test_env_filter_parsing() {
        assert!(EnvFilter::try_new("info").is_ok());
        assert!(EnvFilter::try_new("fortios_mapper=debug").is_ok());
        assert!(EnvFilter::try_new("warn,fortios_mapper::reconcile=debug").is_ok());
    }

    #[test]
    fn test_default_filter_builds() {
        let filter = env_filter("debug");
        assert!(!filter.to_string().is_empty());
    }

    #[test]
    fn test_try_init_is_idempotent() {
        let _ = try_init_logging();
        assert!(!try_init_logging());
    }
}
