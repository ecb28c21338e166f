//! The controller state machine and its serialised workers.
//!
//! A [`Controller`] owns two worker threads. The lifecycle worker runs power
//! transitions one at a time in submission order. The routing worker consumes
//! a single queue of context changes, routing requests, hardware events, and
//! timer expiries. Both operate on one shared core whose mutable state sits
//! behind a single lock; hardware calls are made outside that lock but under a
//! separate hardware lock, so at most one programming call is ever in flight.

use std::fmt;
use std::time::Duration;

use nfc_config::Config;

mod errors;
mod handle;
mod lifecycle;
mod routing;
mod state;
mod worker;

pub use errors::{ControllerError, Operation};
pub use handle::{Controller, ControllerBuilder, ControllerHandle, EventSink};
pub use routing::ApplyOutcome;

/// Power state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ControllerState {
    /// Powered down.
    #[default]
    Off,
    /// Powering up.
    TurningOn,
    /// Powering up after leaving a low-power mode.
    TurningOnForLowPowerExit,
    /// Fully operational.
    On,
    /// Powering down.
    TurningOff,
}

impl ControllerState {
    /// Stable label used in logs and errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::TurningOn => "turning_on",
            Self::TurningOnForLowPowerExit => "turning_on_for_low_power_exit",
            Self::On => "on",
            Self::TurningOff => "turning_off",
        }
    }

    /// Whether the controller is powering up.
    #[must_use]
    pub const fn is_turning_on(self) -> bool {
        matches!(self, Self::TurningOn | Self::TurningOnForLowPowerExit)
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device conditions consulted by [`ControllerHandle::boot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BootContext {
    /// Airplane-mode style override keeping radios off.
    pub radio_off: bool,
    /// Device policy forbids enabling the controller.
    pub user_restricted: bool,
}

/// Tunables the controller reads from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Watchdog budget for initialisation.
    pub init_watchdog: Duration,
    /// Watchdog budget for deinitialisation and routing programming.
    pub routing_watchdog: Duration,
    /// Delay before routing is reapplied while a tag is present.
    pub routing_retry_delay: Duration,
    /// Upper bound accepted for a polling pause.
    pub max_polling_pause: Duration,
    /// Whether the device can emulate cards on the host.
    pub host_card_emulation: bool,
    /// Whether the reader option is enabled.
    pub reader_option: bool,
}

impl From<&Config> for ControllerSettings {
    fn from(config: &Config) -> Self {
        Self {
            init_watchdog: config.init_watchdog(),
            routing_watchdog: config.routing_watchdog(),
            routing_retry_delay: config.routing_retry_delay(),
            max_polling_pause: config.max_polling_pause(),
            host_card_emulation: config.host_card_emulation,
            reader_option: config.reader_option,
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}
