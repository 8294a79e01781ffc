//! Telemetry helpers for structured logging and tracing.

use tracing_subscriber::EnvFilter;

/// Environment variable consulted first for the log filter.
pub const LOG_ENV_VAR: &str = "CRAWL_GOVERNOR_LOG";

/// Initialize tracing. Users can install their own subscriber; this helper
/// installs a default fmt subscriber if none is set.
///
/// The filter comes from `CRAWL_GOVERNOR_LOG`, then `RUST_LOG`, then `info`.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// The tracing dispatcher current on the calling thread.
///
/// Components capture it at construction and re-enter it on their own
/// worker and timer threads, so their events reach the subscriber that was
/// in scope where they were built.
pub(crate) fn current_dispatch() -> tracing::Dispatch {
    tracing::dispatcher::get_default(Clone::clone)
}
