use std::env;

use camino::Utf8PathBuf;

use crate::logging::LogFormat;

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Watchdog budget for bringing the controller up.
pub const DEFAULT_INIT_WATCHDOG_MS: u64 = 90_000;

/// Watchdog budget for shutdown and routing programming.
pub const DEFAULT_ROUTING_WATCHDOG_MS: u64 = 10_000;

/// Delay before routing is reapplied while a tag is in the field.
pub const DEFAULT_ROUTING_RETRY_DELAY_MS: u64 = 5_000;

/// Longest polling pause a caller may request.
pub const DEFAULT_MAX_POLLING_PAUSE_MS: u64 = 40_000;

const STATE_DIR_NAME: &str = "nfcd";

/// Default log filter expression used by the daemon.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the daemon.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Directory holding persisted preferences and the watchdog crash marker.
///
/// Prefers the XDG state directory, then the local data directory, then the
/// system temporary directory.
#[must_use]
pub fn default_state_dir() -> Utf8PathBuf {
    let base = dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .unwrap_or_else(fallback_base_directory);
    base.join(STATE_DIR_NAME)
}

fn fallback_base_directory() -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(env::temp_dir()).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}
