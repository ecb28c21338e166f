//! Discovery and routing-table programming.

use std::sync::Arc;

use nfc_routing::{
    CategoryRoutes, ExecutionEnvironment, PowerFlags, PowerRouteConfig, RouteCategory,
    RoutingPlan, RoutingPolicy, RoutingTableSnapshot,
};
use tracing::{debug, info, warn};

use super::state::Core;
use super::{ControllerError, ControllerState, Operation};
use crate::discovery::{self, DiscoveryParameters, ReaderModeRequest};
use crate::hal::{ClearFlags, HalEvent, HardwareCall};
use crate::screen::{PollingOverlay, ScreenState, ScreenStateMask};
use crate::wakelock::WakeLockGuard;

const ROUTING_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::routing");

/// Result of an apply-routing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The controller is neither on nor shutting down.
    Skipped,
    /// Polling is paused; parameters were left alone.
    Paused,
    /// A tag is connected on an unlocked screen; reapplication was postponed.
    Deferred,
    /// The computed parameters matched those already applied.
    Unchanged,
    /// Discovery was reprogrammed.
    Reprogrammed,
}

/// Whether the state gate applies to an apply-routing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Gate {
    Enforce,
    Bypass,
}

impl Core {
    /// Recomputes discovery parameters and reprograms the controller when
    /// they changed or `force` is set.
    pub(super) fn apply_routing(
        &self,
        force: bool,
        gate: Gate,
    ) -> Result<ApplyOutcome, ControllerError> {
        let _hardware = self.hardware();
        let (context, current) = {
            let shared = self.lock();
            let open = matches!(shared.state, ControllerState::On | ControllerState::TurningOff)
                || shared.routing_gate_open;
            if gate == Gate::Enforce && !open {
                return Ok(ApplyOutcome::Skipped);
            }
            if shared.screen == ScreenState::OnUnlocked && shared.tag_handle.is_some() {
                debug!(target: ROUTING_TARGET, "tag connected; postponing discovery update");
                return Ok(ApplyOutcome::Deferred);
            }
            if shared.polling_paused {
                debug!(target: ROUTING_TARGET, "polling paused; discovery left unchanged");
                return Ok(ApplyOutcome::Paused);
            }
            (self.discovery_context(&shared), shared.discovery)
        };

        let watchdog = self.watchdog("applyRouting", self.settings.routing_watchdog);
        let params = discovery::compute(&context);
        let outcome = if force || params != current {
            if params.should_enable_discovery() {
                self.host
                    .enable_discovery(&params, current.should_enable_discovery());
            } else {
                self.host.disable_discovery();
            }
            self.lock().discovery = params;
            info!(target: ROUTING_TARGET, %params, force, "discovery reprogrammed");
            ApplyOutcome::Reprogrammed
        } else {
            debug!(target: ROUTING_TARGET, "discovery configuration equal, not updating");
            ApplyOutcome::Unchanged
        };
        Self::finish(watchdog)?;
        Ok(outcome)
    }

    /// Builds the routing policy inputs from hardware defaults and preferences.
    fn routing_inputs(
        &self,
    ) -> (
        RoutingPolicy,
        CategoryRoutes<Option<PowerRouteConfig>>,
        Option<ExecutionEnvironment>,
    ) {
        let defaults = CategoryRoutes::from_fn(|category| self.host.default_route(category));
        let shared = self.lock();
        (
            RoutingPolicy::new(shared.nci_version, defaults),
            shared.preferences.stored_routes(),
            shared.overflow_route,
        )
    }

    /// Computes the routing plan without touching the controller.
    pub(super) fn compute_routing_plan(&self) -> RoutingPlan {
        let (policy, stored, overflow) = self.routing_inputs();
        policy.compute(&stored, overflow)
    }

    /// Clears staged routes and stages the current plan.
    pub(super) fn program_routes(&self) -> Result<RoutingPlan, ControllerError> {
        let plan = self.compute_routing_plan();
        let _hardware = self.hardware();
        if !self.host.clear_routing_entry(ClearFlags::ALL) {
            return Err(ControllerError::HardwareCallFailed {
                call: HardwareCall::ClearRoutingEntry,
            });
        }
        for request in plan.requests() {
            let staged = self.host.set_routing_entry(
                request.entry_type,
                request.value,
                request.route.target(),
                request.route.power_state(),
            );
            if !staged {
                return Err(ControllerError::HardwareCallFailed {
                    call: HardwareCall::SetRoutingEntry,
                });
            }
        }
        debug!(
            target: ROUTING_TARGET,
            requests = plan.requests().len(),
            "routing requests staged"
        );
        Ok(plan)
    }

    /// Commits staged routes and refreshes the snapshot. A table that no
    /// longer fits moves the default route to the host once.
    pub(super) fn commit_routing(&self) -> Result<Arc<RoutingTableSnapshot>, ControllerError> {
        let snapshot = self.commit_once()?;
        if snapshot.is_over_capacity() {
            return self.route_overflow_to_host(&snapshot);
        }
        Ok(snapshot)
    }

    fn commit_once(&self) -> Result<Arc<RoutingTableSnapshot>, ControllerError> {
        let state = self.state();
        if state == ControllerState::Off {
            return Err(ControllerError::TransitionRejected {
                operation: Operation::CommitRouting,
                state,
            });
        }

        let watchdog = self.watchdog("commitRouting", self.settings.routing_watchdog);
        let (committed, bytes, max_size) = {
            let _wake = WakeLockGuard::acquire(Arc::clone(&self.wake_lock));
            let _hardware = self.hardware();
            let committed = self.host.commit_routing();
            (
                committed,
                self.host.routing_table(),
                self.host.max_routing_table_size(),
            )
        };
        Self::finish(watchdog)?;
        if !committed {
            warn!(target: ROUTING_TARGET, "routing commit failed");
            return Err(ControllerError::HardwareCallFailed {
                call: HardwareCall::CommitRouting,
            });
        }

        let snapshot = Arc::new(RoutingTableSnapshot::from_bytes(&bytes, max_size));
        if let Some(error) = snapshot.decode_error() {
            warn!(target: ROUTING_TARGET, %error, "routing table read back malformed");
        }
        info!(
            target: ROUTING_TARGET,
            entries = snapshot.entries().len(),
            current_size = snapshot.current_size(),
            max_size = snapshot.max_size(),
            "routing committed"
        );
        self.lock().snapshot = Arc::clone(&snapshot);
        Ok(snapshot)
    }

    /// Stages and commits the current plan.
    pub(super) fn reprogram_routing(&self) -> Result<Arc<RoutingTableSnapshot>, ControllerError> {
        self.program_routes()?;
        self.commit_routing()
    }

    /// Reports a full table and retargets the default route to the host.
    fn route_overflow_to_host(
        &self,
        snapshot: &Arc<RoutingTableSnapshot>,
    ) -> Result<Arc<RoutingTableSnapshot>, ControllerError> {
        self.reporter
            .routing_table_full(snapshot.current_size(), snapshot.max_size());
        let first = {
            let mut shared = self.lock();
            let first = shared.overflow_route != Some(ExecutionEnvironment::Host);
            shared.overflow_route = Some(ExecutionEnvironment::Host);
            first
        };
        if !first {
            return Ok(Arc::clone(snapshot));
        }
        self.program_routes()?;
        self.commit_once()
    }

    /// Sets or clears the default-route overflow override and reprograms.
    pub(super) fn set_overflow_route(
        &self,
        target: Option<ExecutionEnvironment>,
    ) -> Result<(), ControllerError> {
        self.lock().overflow_route = target;
        self.reprogram_if_enabled()
    }

    /// Persists a new default AID target, keeping its power states.
    pub(super) fn update_default_aid_route(
        &self,
        target: ExecutionEnvironment,
    ) -> Result<(), ControllerError> {
        let (policy, stored, _) = self.routing_inputs();
        let current = policy.resolve(RouteCategory::DefaultAid, stored.default_aid);
        let updated = current.with_target(target).normalized(policy.version());
        self.update_preferences(|preferences| {
            preferences.set_route(RouteCategory::DefaultAid, updated);
        })?;
        info!(target: ROUTING_TARGET, route = %target, "default AID route updated");
        self.reprogram_if_enabled()
    }

    /// Persists a route built from user power flags.
    pub(super) fn set_power_route(
        &self,
        category: RouteCategory,
        target: ExecutionEnvironment,
        flags: PowerFlags,
    ) -> Result<(), ControllerError> {
        let hardware_default = self.host.default_route(category);
        let route = PowerRouteConfig::from_flags(target, flags, hardware_default.power_state());
        self.update_preferences(|preferences| preferences.set_route(category, route))?;
        info!(
            target: ROUTING_TARGET,
            %category,
            route = %target,
            power_state = route.power_state(),
            "power route updated"
        );
        self.reprogram_if_enabled()
    }

    fn reprogram_if_enabled(&self) -> Result<(), ControllerError> {
        if self.state() == ControllerState::On {
            self.reprogram_routing()?;
        }
        Ok(())
    }

    /// Sends the screen state, with polling overlays, to the controller.
    pub(super) fn push_screen_state(&self, screen: ScreenState) {
        let reader = if self.lock().reader_mode.is_some() {
            PollingOverlay::READER
        } else {
            PollingOverlay::NONE
        };
        let unlock_polling = self
            .unlock
            .as_ref()
            .is_some_and(|unlock| unlock.is_polling_enabled());
        let tag = if unlock_polling {
            PollingOverlay::TAG
        } else {
            PollingOverlay::NONE
        };
        let overlay = tag | reader;
        let _hardware = self.hardware();
        self.host.set_screen_state(ScreenStateMask {
            state: screen,
            overlay,
        });
    }

    pub(super) fn on_screen_state_changed(
        &self,
        screen: ScreenState,
    ) -> Result<ApplyOutcome, ControllerError> {
        let enabled = {
            let mut shared = self.lock();
            shared.screen = screen;
            shared.state == ControllerState::On
        };
        debug!(target: ROUTING_TARGET, %screen, "screen state changed");
        if !enabled {
            return Ok(ApplyOutcome::Skipped);
        }
        self.push_screen_state(screen);
        self.apply_routing(false, Gate::Enforce)
    }

    pub(super) fn on_reader_mode_changed(
        &self,
        request: Option<ReaderModeRequest>,
    ) -> Result<ApplyOutcome, ControllerError> {
        match &request {
            Some(active) => info!(
                target: ROUTING_TARGET,
                requester = %active.requester,
                technologies = %active.technologies,
                "reader mode requested"
            ),
            None => info!(target: ROUTING_TARGET, "reader mode cleared"),
        }
        self.lock().reader_mode = request;
        self.apply_routing(false, Gate::Enforce)
    }

    pub(super) fn set_provisioning_mode(&self, provisioning: bool) {
        self.lock().provisioning = provisioning;
    }

    pub(super) fn set_secure_mode(&self, secure: bool) -> Result<(), ControllerError> {
        self.update_preferences(|preferences| preferences.secure_nfc_on = secure)
    }

    /// Stops discovery until resumed.
    pub(super) fn pause_polling(&self) -> Result<(), ControllerError> {
        let _hardware = self.hardware();
        {
            let mut shared = self.lock();
            if shared.state != ControllerState::On {
                return Err(ControllerError::TransitionRejected {
                    operation: Operation::PausePolling,
                    state: shared.state,
                });
            }
            shared.polling_paused = true;
            shared.discovery = DiscoveryParameters::default();
        }
        self.host.disable_discovery();
        info!(target: ROUTING_TARGET, "polling paused");
        Ok(())
    }

    /// Lifts a polling pause without reprogramming.
    pub(super) fn clear_polling_pause(&self) -> bool {
        std::mem::replace(&mut self.lock().polling_paused, false)
    }

    /// Lifts a polling pause and forces discovery back on.
    pub(super) fn resume_polling(&self) -> Result<ApplyOutcome, ControllerError> {
        if !self.clear_polling_pause() {
            return Ok(ApplyOutcome::Unchanged);
        }
        info!(target: ROUTING_TARGET, "polling resumed");
        self.apply_routing(true, Gate::Enforce)
    }

    /// Records a hardware event.
    pub(super) fn on_hal_event(&self, event: HalEvent) -> Result<(), ControllerError> {
        match event {
            HalEvent::TagDiscovered { handle } => {
                self.lock().tag_handle = Some(handle);
                debug!(target: ROUTING_TARGET, handle, "tag discovered");
            }
            HalEvent::TagLost { handle } => {
                let mut shared = self.lock();
                if shared.tag_handle == Some(handle) {
                    shared.tag_handle = None;
                }
                drop(shared);
                debug!(target: ROUTING_TARGET, handle, "tag lost");
            }
            HalEvent::RoutingTableFull => {
                if self.state() != ControllerState::On {
                    return Ok(());
                }
                let snapshot = Arc::clone(&self.lock().snapshot);
                self.route_overflow_to_host(&snapshot)?;
            }
        }
        Ok(())
    }

    /// Lifecycle timer generation; bumped when pending timers must lapse.
    pub(super) fn timer_generation(&self) -> u64 {
        self.lock().timer_generation
    }
}
