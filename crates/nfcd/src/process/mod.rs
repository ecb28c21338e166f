//! Daemon process supervision: controller startup, crash recovery, and
//! shutdown handling.

mod errors;
mod launch;
mod recovery;
mod shutdown;

pub use errors::LaunchError;
pub use launch::run_daemon;
pub use shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};

#[cfg(test)]
pub(crate) use launch::{LaunchPlan, run_daemon_with};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
