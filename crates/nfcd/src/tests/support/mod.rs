//! Test harness utilities shared by the controller and daemon suites.

mod abort;
mod config_loader;
mod harness;
mod reporter;
mod world;

pub use abort::RecordingAbort;
pub use config_loader::{BlockedStateDirLoader, FailingConfigLoader, TestConfigLoader};
pub use harness::{Harness, HarnessOptions, fast_settings};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use world::{TestWorld, world};
