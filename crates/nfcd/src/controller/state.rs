//! Shared core owned by both controller workers.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use nfc_routing::{ExecutionEnvironment, NciVersion, RoutingTableSnapshot};
use tracing::info;

use super::{ControllerError, ControllerSettings, ControllerState};
use crate::discovery::{DiscoveryContext, DiscoveryParameters, ReaderModeRequest};
use crate::hal::DeviceHost;
use crate::health::HealthReporter;
use crate::preferences::{PreferenceStore, Preferences};
use crate::screen::{ScreenState, ScreenStateSource};
use crate::unlock::LockscreenUnlock;
use crate::wakelock::WakeLock;
use crate::watchdog::{AbortAction, Watchdog, WatchdogGuard, WatchdogOutcome};

pub(super) const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");

/// Mutable controller state. Only touched under [`Core::lock`].
#[derive(Debug)]
pub(super) struct Shared {
    pub(super) state: ControllerState,
    pub(super) booted: bool,
    pub(super) routing_gate_open: bool,
    pub(super) screen: ScreenState,
    pub(super) reader_mode: Option<ReaderModeRequest>,
    pub(super) provisioning: bool,
    pub(super) discovery: DiscoveryParameters,
    pub(super) polling_paused: bool,
    pub(super) tag_handle: Option<u32>,
    pub(super) overflow_route: Option<ExecutionEnvironment>,
    pub(super) snapshot: Arc<RoutingTableSnapshot>,
    pub(super) preferences: Preferences,
    pub(super) nci_version: NciVersion,
    pub(super) timer_generation: u64,
}

impl Shared {
    pub(super) fn new(preferences: Preferences) -> Self {
        Self {
            state: ControllerState::Off,
            booted: false,
            routing_gate_open: false,
            screen: ScreenState::Unknown,
            reader_mode: None,
            provisioning: false,
            discovery: DiscoveryParameters::default(),
            polling_paused: false,
            tag_handle: None,
            overflow_route: None,
            snapshot: Arc::new(RoutingTableSnapshot::default()),
            preferences,
            nci_version: NciVersion::V1,
            timer_generation: 0,
        }
    }
}

/// Collaborators injected at startup.
pub(super) struct Collaborators {
    pub(super) host: Arc<dyn DeviceHost>,
    pub(super) store: Arc<dyn PreferenceStore>,
    pub(super) reporter: Arc<dyn HealthReporter>,
    pub(super) screen_source: Arc<dyn ScreenStateSource>,
    pub(super) unlock: Option<Arc<dyn LockscreenUnlock>>,
    pub(super) wake_lock: Arc<dyn WakeLock>,
    pub(super) abort: Arc<dyn AbortAction>,
}

/// State and collaborators shared by the lifecycle and routing workers.
pub(super) struct Core {
    pub(super) host: Arc<dyn DeviceHost>,
    pub(super) store: Arc<dyn PreferenceStore>,
    pub(super) reporter: Arc<dyn HealthReporter>,
    pub(super) screen_source: Arc<dyn ScreenStateSource>,
    pub(super) unlock: Option<Arc<dyn LockscreenUnlock>>,
    pub(super) wake_lock: Arc<dyn WakeLock>,
    abort: Arc<dyn AbortAction>,
    pub(super) settings: ControllerSettings,
    shared: Mutex<Shared>,
    hardware: Mutex<()>,
    persist: Mutex<()>,
}

impl Core {
    pub(super) fn new(
        collaborators: Collaborators,
        settings: ControllerSettings,
        preferences: Preferences,
    ) -> Self {
        let Collaborators {
            host,
            store,
            reporter,
            screen_source,
            unlock,
            wake_lock,
            abort,
        } = collaborators;
        Self {
            host,
            store,
            reporter,
            screen_source,
            unlock,
            wake_lock,
            abort,
            settings,
            shared: Mutex::new(Shared::new(preferences)),
            hardware: Mutex::new(()),
            persist: Mutex::new(()),
        }
    }

    /// Locks the shared state. Never call hardware while holding the guard.
    pub(super) fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serialises hardware programming. Acquire before [`Core::lock`], never
    /// after.
    pub(super) fn hardware(&self) -> MutexGuard<'_, ()> {
        self.hardware.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn state(&self) -> ControllerState {
        self.lock().state
    }

    /// Moves to `next`, notifying observers when the state actually changes.
    pub(super) fn set_state(&self, next: ControllerState) {
        let previous = {
            let mut shared = self.lock();
            std::mem::replace(&mut shared.state, next)
        };
        if previous == next {
            return;
        }
        info!(
            target: LIFECYCLE_TARGET,
            from = %previous,
            to = %next,
            "controller state changed"
        );
        self.reporter.controller_state_changed(next);
    }

    pub(super) fn watchdog(&self, name: &'static str, timeout: Duration) -> WatchdogGuard {
        Watchdog::new(name, timeout, Arc::clone(&self.abort)).start()
    }

    /// Cancels `guard`, turning an expiry into [`ControllerError::WatchdogTimeout`].
    pub(super) fn finish(guard: WatchdogGuard) -> Result<(), ControllerError> {
        let watchdog = guard.name();
        match guard.cancel() {
            WatchdogOutcome::Completed => Ok(()),
            WatchdogOutcome::Fired => Err(ControllerError::WatchdogTimeout { watchdog }),
        }
    }

    pub(super) fn preferences(&self) -> Preferences {
        self.lock().preferences.clone()
    }

    /// Applies `update` to the cached preferences and persists the result.
    pub(super) fn update_preferences(
        &self,
        update: impl FnOnce(&mut Preferences),
    ) -> Result<(), ControllerError> {
        let _persist = self.persist.lock().unwrap_or_else(PoisonError::into_inner);
        let updated = {
            let mut shared = self.lock();
            update(&mut shared.preferences);
            shared.preferences.clone()
        };
        self.store.save(&updated)?;
        Ok(())
    }

    /// Builds the discovery inputs from the current shared state.
    pub(super) fn discovery_context(&self, shared: &Shared) -> DiscoveryContext {
        DiscoveryContext {
            screen: shared.screen,
            reader_mode: shared.reader_mode.clone(),
            provisioning: shared.provisioning,
            lockscreen_unlock: self
                .unlock
                .as_ref()
                .map(|unlock| unlock.registered_technologies()),
            reader_option: self.settings.reader_option,
            secure_mode: shared.preferences.secure_nfc_on,
            host_card_emulation: self.settings.host_card_emulation,
        }
    }
}
