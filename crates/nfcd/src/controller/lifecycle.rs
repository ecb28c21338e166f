//! Power transitions. Every function here runs on the lifecycle worker.

use std::sync::Arc;

use nfc_routing::ExecutionEnvironment;
use tracing::{debug, info, warn};

use super::routing::Gate;
use super::state::{Core, LIFECYCLE_TARGET};
use super::{BootContext, ControllerError, ControllerState, Operation};
use crate::discovery::DiscoveryParameters;
use crate::hal::HardwareCall;
use crate::wakelock::WakeLockGuard;

impl Core {
    /// Powers the controller up.
    ///
    /// Already on, or already turning on, is success. Turning off is
    /// rejected.
    pub(super) fn enable(&self, operation: Operation) -> Result<(), ControllerError> {
        let state = self.state();
        match state {
            ControllerState::On
            | ControllerState::TurningOn
            | ControllerState::TurningOnForLowPowerExit => {
                debug!(target: LIFECYCLE_TARGET, %operation, %state, "already enabled");
                return Ok(());
            }
            ControllerState::TurningOff => {
                return Err(ControllerError::TransitionRejected { operation, state });
            }
            ControllerState::Off => {}
        }

        let transitional = if operation == Operation::EnableForLowPowerExit {
            ControllerState::TurningOnForLowPowerExit
        } else {
            ControllerState::TurningOn
        };
        self.set_state(transitional);

        let budget = self.settings.init_watchdog.max(self.host.init_timeout());
        let watchdog = self.watchdog("enableInternal", budget);
        let initialised = {
            let _wake = WakeLockGuard::acquire(Arc::clone(&self.wake_lock));
            let _hardware = self.hardware();
            self.host.initialize()
        };
        if let Err(error) = Self::finish(watchdog) {
            self.set_state(ControllerState::Off);
            return Err(error);
        }
        if !initialised {
            warn!(target: LIFECYCLE_TARGET, %operation, "controller initialisation failed");
            self.set_state(ControllerState::Off);
            return Err(ControllerError::HardwareCallFailed {
                call: HardwareCall::Initialize,
            });
        }

        match self.configure_after_init(operation) {
            Ok(()) => {
                self.set_state(ControllerState::On);
                Ok(())
            }
            Err(error) => {
                self.lock().routing_gate_open = false;
                self.set_state(ControllerState::Off);
                Err(error)
            }
        }
    }

    fn configure_after_init(&self, operation: Operation) -> Result<(), ControllerError> {
        if operation != Operation::EnableForLowPowerExit {
            self.restore_execution_environment();
        }

        let version = self.host.nci_version();
        let screen = self.screen_source.current();
        {
            let mut shared = self.lock();
            shared.nci_version = version;
            shared.screen = screen;
        }
        self.push_screen_state(screen);

        if let Err(error) = self.program_routes() {
            warn!(target: LIFECYCLE_TARGET, %error, "routing table could not be staged");
        }

        self.apply_routing(true, Gate::Bypass)?;
        self.lock().routing_gate_open = true;
        self.apply_routing(false, Gate::Enforce)?;

        match self.commit_routing() {
            Ok(_) => {}
            Err(error @ ControllerError::WatchdogTimeout { .. }) => return Err(error),
            Err(error) => warn!(target: LIFECYCLE_TARGET, %error, "routing commit failed"),
        }
        info!(target: LIFECYCLE_TARGET, %operation, %screen, "controller enabled");
        Ok(())
    }

    /// Powers the controller down.
    ///
    /// Already off, or already turning off, is success. Turning on is
    /// rejected. A failing deinit is logged and the controller still ends
    /// `Off`.
    pub(super) fn disable(&self) -> Result<(), ControllerError> {
        let state = self.state();
        match state {
            ControllerState::Off | ControllerState::TurningOff => {
                debug!(target: LIFECYCLE_TARGET, %state, "already disabled");
                return Ok(());
            }
            ControllerState::TurningOn | ControllerState::TurningOnForLowPowerExit => {
                return Err(ControllerError::TransitionRejected {
                    operation: Operation::Disable,
                    state,
                });
            }
            ControllerState::On => {}
        }
        self.set_state(ControllerState::TurningOff);

        let had_endpoint = {
            let mut shared = self.lock();
            shared.reader_mode = None;
            shared.polling_paused = false;
            shared.timer_generation = shared.timer_generation.wrapping_add(1);
            shared.tag_handle.take().is_some()
        };
        if had_endpoint {
            let _hardware = self.hardware();
            self.host.disconnect_remote_endpoint();
        }

        let watchdog = self.watchdog("disableInternal", self.settings.routing_watchdog);
        let deinitialised = {
            let _wake = WakeLockGuard::acquire(Arc::clone(&self.wake_lock));
            let _hardware = self.hardware();
            self.host.deinitialize()
        };
        let finished = Self::finish(watchdog);
        if !deinitialised {
            warn!(target: LIFECYCLE_TARGET, "controller deinitialisation failed");
        }

        {
            let mut shared = self.lock();
            shared.routing_gate_open = false;
            shared.discovery = DiscoveryParameters::default();
        }
        self.set_state(ControllerState::Off);
        finished?;
        info!(target: LIFECYCLE_TARGET, "controller disabled");
        Ok(())
    }

    /// Process-start initialisation. Runs at most once.
    pub(super) fn boot(&self, context: BootContext) -> Result<(), ControllerError> {
        {
            let mut shared = self.lock();
            if shared.booted {
                return Err(ControllerError::TransitionRejected {
                    operation: Operation::Boot,
                    state: shared.state,
                });
            }
            shared.booted = true;
        }

        let preferences = self.preferences();
        if preferences.first_boot {
            info!(target: LIFECYCLE_TARGET, "first boot; resetting controller configuration");
            {
                let _hardware = self.hardware();
                self.host.factory_reset();
            }
            self.update_preferences(|stored| {
                stored.first_boot = false;
                stored.payment_default_set = true;
            })?;
        }

        if preferences.nfc_on && !context.radio_off && !context.user_restricted {
            return self.enable(Operation::Boot);
        }

        let firmware_ok = {
            let _hardware = self.hardware();
            self.host.check_firmware()
        };
        info!(
            target: LIFECYCLE_TARGET,
            firmware_ok,
            radio_off = context.radio_off,
            user_restricted = context.user_restricted,
            nfc_on = preferences.nfc_on,
            "controller left off at boot"
        );
        Ok(())
    }

    /// Disables and re-enables the controller.
    pub(super) fn restart(&self) -> Result<(), ControllerError> {
        self.disable()?;
        self.enable(Operation::Restart)
    }

    /// Records the user's on/off choice.
    pub(super) fn persist_enabled(&self, enabled: bool) -> Result<(), ControllerError> {
        self.update_preferences(|preferences| preferences.nfc_on = enabled)
    }

    fn restore_execution_environment(&self) {
        let Some(selected) = self.lock().preferences.secure_element else {
            return;
        };
        let attached = self.host.secure_elements();
        if !attached.contains(&selected) {
            warn!(
                target: LIFECYCLE_TARGET,
                environment = %selected,
                "persisted execution environment is not attached"
            );
            return;
        }
        let _hardware = self.hardware();
        if self.host.select_secure_element(selected) {
            info!(target: LIFECYCLE_TARGET, environment = %selected, "execution environment restored");
        } else {
            warn!(
                target: LIFECYCLE_TARGET,
                environment = %selected,
                "execution environment could not be restored"
            );
        }
    }

    /// Selects `environment` for off-host routing and persists the choice.
    pub(super) fn select_execution_environment(
        &self,
        environment: ExecutionEnvironment,
    ) -> Result<(), ControllerError> {
        if !self.host.secure_elements().contains(&environment) {
            return Err(ControllerError::UnknownExecutionEnvironment { environment });
        }
        let state = self.state();
        if state != ControllerState::On {
            return Err(ControllerError::TransitionRejected {
                operation: Operation::SelectExecutionEnvironment,
                state,
            });
        }
        let selected = {
            let _hardware = self.hardware();
            self.host.select_secure_element(environment)
        };
        if !selected {
            return Err(ControllerError::HardwareCallFailed {
                call: HardwareCall::SelectSecureElement,
            });
        }
        self.update_preferences(|preferences| preferences.secure_element = Some(environment))?;
        info!(target: LIFECYCLE_TARGET, %environment, "execution environment selected");
        Ok(())
    }

    /// Deselects the persisted environment, if any.
    pub(super) fn deselect_execution_environment(&self) -> Result<(), ControllerError> {
        let Some(environment) = self.lock().preferences.secure_element else {
            return Ok(());
        };
        if self.state() == ControllerState::On {
            let deselected = {
                let _hardware = self.hardware();
                self.host.deselect_secure_element(environment)
            };
            if !deselected {
                return Err(ControllerError::HardwareCallFailed {
                    call: HardwareCall::DeselectSecureElement,
                });
            }
        }
        self.update_preferences(|preferences| preferences.secure_element = None)?;
        info!(target: LIFECYCLE_TARGET, %environment, "execution environment deselected");
        Ok(())
    }
}
