//! Control plane for an NFC controller.
//!
//! The daemon owns the controller's power lifecycle and keeps its discovery
//! and listen-mode routing configuration in line with the device context.
//! A [`Controller`] runs two workers over a shared core: one serialises power
//! transitions, the other consumes screen, reader-mode, and hardware events
//! and reprograms the radio when the derived configuration changes. Every
//! blocking hardware call runs under a [`watchdog::Watchdog`] whose expiry
//! aborts the process so its supervisor can restart it against a reset
//! controller.
//!
//! Hardware is reached through [`DeviceHost`]; the bundled
//! [`SimulatedController`] stands in for a vendor HAL. Routing table codecs
//! and policy live in [`nfc_routing`]; configuration in [`nfc_config`].

mod bootstrap;
mod controller;
pub mod discovery;
pub mod hal;
mod health;
pub mod preferences;
mod process;
pub mod screen;
mod simulator;
mod telemetry;
pub mod unlock;
pub mod wakelock;
pub mod watchdog;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use controller::{
    ApplyOutcome, BootContext, Controller, ControllerBuilder, ControllerError, ControllerHandle,
    ControllerSettings, ControllerState, EventSink, Operation,
};
pub use hal::{DeviceHost, HalEvent};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon};
pub use simulator::{HostCall, SimulatedController};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
