//! Test double for [`HealthReporter`] that records structured events for assertions.

use std::sync::Mutex;

use nfc_config::Config;

use crate::bootstrap::BootstrapError;
use crate::controller::ControllerState;
use crate::health::HealthReporter;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HealthEvent {
    /// Bootstrap started.
    BootstrapStarting,
    /// Bootstrap completed successfully.
    BootstrapSucceeded,
    /// Bootstrap failed with an error description.
    BootstrapFailed(String),
    /// The controller entered a state.
    StateChanged(ControllerState),
    /// The routing table overflowed.
    RoutingTableFull { current: usize, max: usize },
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    /// Controller states in the order they were entered.
    #[must_use]
    pub fn states(&self) -> Vec<ControllerState> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HealthEvent::StateChanged(state) => Some(state),
                _ => None,
            })
            .collect()
    }

    /// Number of table-full notifications.
    #[must_use]
    pub fn table_full_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, HealthEvent::RoutingTableFull { .. }))
            .count()
    }

    pub fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn controller_state_changed(&self, state: ControllerState) {
        self.record(HealthEvent::StateChanged(state));
    }

    fn routing_table_full(&self, current_size: usize, max_size: usize) {
        self.record(HealthEvent::RoutingTableFull {
            current: current_size,
            max: max_size,
        });
    }
}
