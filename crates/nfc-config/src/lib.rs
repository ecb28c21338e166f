//! Layered configuration for the NFC control-plane daemon.
//!
//! Values resolve in increasing precedence from built-in defaults, a TOML
//! file named by `--config-path` or `NFCD_CONFIG_PATH`, `NFCD_*` environment
//! variables, and command-line flags. The resolved [`Config`] carries the
//! logging setup, the watchdog budgets for each guarded operation, the
//! device capabilities that shape discovery, and the state directory.

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

mod defaults;
mod logging;
mod paths;

pub use defaults::{
    DEFAULT_INIT_WATCHDOG_MS, DEFAULT_LOG_FILTER, DEFAULT_MAX_POLLING_PAUSE_MS,
    DEFAULT_ROUTING_RETRY_DELAY_MS, DEFAULT_ROUTING_WATCHDOG_MS, default_log_filter,
    default_log_filter_string, default_log_format, default_state_dir,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use paths::{StatePaths, StatePathsError};

/// Daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "NFCD")]
pub struct Config {
    /// `tracing` filter directive.
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
    /// Watchdog budget for controller initialisation, in milliseconds.
    #[ortho_config(default = DEFAULT_INIT_WATCHDOG_MS)]
    pub init_watchdog_ms: u64,
    /// Watchdog budget for deinitialisation and routing programming.
    #[ortho_config(default = DEFAULT_ROUTING_WATCHDOG_MS)]
    pub routing_watchdog_ms: u64,
    /// Delay before routing is reapplied while a tag is present.
    #[ortho_config(default = DEFAULT_ROUTING_RETRY_DELAY_MS)]
    pub routing_retry_delay_ms: u64,
    /// Upper bound accepted for a polling pause.
    #[ortho_config(default = DEFAULT_MAX_POLLING_PAUSE_MS)]
    pub max_polling_pause_ms: u64,
    /// Whether the device can emulate cards on the host.
    #[ortho_config(default = true)]
    pub host_card_emulation: bool,
    /// Whether the reader option is enabled on this device.
    #[ortho_config(default = true)]
    pub reader_option: bool,
    /// Directory holding persisted preferences and the crash marker.
    #[ortho_config(default = defaults::default_state_dir())]
    pub state_dir: Utf8PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            init_watchdog_ms: DEFAULT_INIT_WATCHDOG_MS,
            routing_watchdog_ms: DEFAULT_ROUTING_WATCHDOG_MS,
            routing_retry_delay_ms: DEFAULT_ROUTING_RETRY_DELAY_MS,
            max_polling_pause_ms: DEFAULT_MAX_POLLING_PAUSE_MS,
            host_card_emulation: true,
            reader_option: true,
            state_dir: default_state_dir(),
        }
    }
}

impl Config {
    /// Filter directive for the telemetry subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Watchdog budget for controller initialisation.
    #[must_use]
    pub const fn init_watchdog(&self) -> Duration {
        Duration::from_millis(self.init_watchdog_ms)
    }

    /// Watchdog budget for deinitialisation and routing programming.
    #[must_use]
    pub const fn routing_watchdog(&self) -> Duration {
        Duration::from_millis(self.routing_watchdog_ms)
    }

    /// Delay before routing is reapplied while a tag is present.
    #[must_use]
    pub const fn routing_retry_delay(&self) -> Duration {
        Duration::from_millis(self.routing_retry_delay_ms)
    }

    /// Upper bound accepted for a polling pause.
    #[must_use]
    pub const fn max_polling_pause(&self) -> Duration {
        Duration::from_millis(self.max_polling_pause_ms)
    }
}
