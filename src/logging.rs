//! Tracing subscriber setup for the `rigstack` binary.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, for example `rigstack=debug`.
pub const LOG_ENV: &str = "RIGSTACK_LOG";

/// Filter used when [`LOG_ENV`] is unset or unparsable.
pub const DEFAULT_FILTER: &str = "warn";

/// Builds the filter from [`LOG_ENV`], raising the default to `debug` when
/// `verbose` is set.
#[must_use]
pub fn env_filter(verbose: bool) -> EnvFilter {
    let fallback = if verbose {
        "rigstack=debug"
    } else {
        DEFAULT_FILTER
    };
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Installs a compact stderr subscriber. Repeated calls are ignored so tests
/// and embedders that already installed a subscriber keep theirs.
pub fn init(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init()
        .ok();
}
