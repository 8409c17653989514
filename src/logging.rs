//! Diagnostic logging setup.
//!
//! Library code only emits `tracing` events; hosts opt in to seeing them by
//! calling [`init`] once at startup.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Installs a stderr fmt subscriber filtered by `filter` (an `EnvFilter`
/// directive string such as `repl_session=debug`).
///
/// Returns false when a global subscriber was already installed, either by an
/// earlier call or by the host itself.
pub fn init(filter: Option<&str>) -> bool {
    static INSTALLED: OnceLock<bool> = OnceLock::new();

    let directives = filter.unwrap_or(DEFAULT_LOG_FILTER).to_string();
    let mut first_call = false;
    let installed = *INSTALLED.get_or_init(|| {
        first_call = true;
        let env_filter = EnvFilter::try_new(&directives)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init()
            .is_ok()
    });

    first_call && installed
}
