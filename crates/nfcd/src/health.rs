//! Structured health reporting for daemon and controller events.

use std::sync::Arc;

use nfc_config::Config;

use crate::bootstrap::BootstrapError;
use crate::controller::ControllerState;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");
const NOTIFY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::notify");

/// Observer for lifecycle events surfaced to operators and collaborators.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked whenever the controller enters a new state.
    fn controller_state_changed(&self, state: ControllerState);

    /// Invoked when programmed routes no longer fit the controller's table.
    fn routing_table_full(&self, current_size: usize, max_size: usize);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn controller_state_changed(&self, state: ControllerState) {
        (**self).controller_state_changed(state);
    }

    fn routing_table_full(&self, current_size: usize, max_size: usize) {
        (**self).routing_table_full(current_size, max_size);
    }
}

/// Default reporter that records events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            state_dir = %config.state_dir,
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn controller_state_changed(&self, state: ControllerState) {
        tracing::info!(
            target: NOTIFY_TARGET,
            event = "state_changed",
            state = %state,
            "controller state changed"
        );
    }

    fn routing_table_full(&self, current_size: usize, max_size: usize) {
        tracing::warn!(
            target: NOTIFY_TARGET,
            event = "routing_table_full",
            current_size,
            max_size,
            "routing table full; default route moved to host"
        );
    }
}
