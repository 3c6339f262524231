//! Diagnostic logging for the launcher.
//!
//! - **Logging (this module)**: diagnostics via `LAUNCHER_LOG`, written to
//!   stderr so the engine's stdout stays clean.
//! - **Launch traces (`io/trace`)**: timing artifacts written under the
//!   project's log directory, independent of the log filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "LAUNCHER_LOG";

/// Initialize the tracing subscriber.
///
/// Reads `LAUNCHER_LOG`. Defaults to `warn` if unset or invalid.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// LAUNCHER_LOG=launcher=debug launcher build //app
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
