//! Running controller wired to in-memory collaborators.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::controller::{Controller, ControllerError, ControllerHandle, ControllerSettings};
use crate::discovery::TechMask;
use crate::preferences::{MemoryPreferenceStore, Preferences};
use crate::screen::{ScreenState, ScreenStateCell};
use crate::simulator::SimulatedController;
use crate::unlock::{LockscreenUnlock, UnlockRegistry};
use crate::wakelock::TrackedWakeLock;
use crate::ControllerBuilder;

use super::abort::RecordingAbort;
use super::reporter::RecordingHealthReporter;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Settings with short timers so scenarios finish quickly.
#[must_use]
pub fn fast_settings() -> ControllerSettings {
    ControllerSettings {
        init_watchdog: Duration::from_secs(5),
        routing_watchdog: Duration::from_secs(5),
        routing_retry_delay: Duration::from_millis(200),
        max_polling_pause: Duration::from_secs(2),
        host_card_emulation: true,
        reader_option: true,
    }
}

/// Inputs used to start a [`Harness`].
pub struct HarnessOptions {
    pub host: SimulatedController,
    pub preferences: Preferences,
    pub settings: ControllerSettings,
    pub screen: ScreenState,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            host: SimulatedController::new(),
            preferences: Preferences::default(),
            settings: fast_settings(),
            screen: ScreenState::OnUnlocked,
        }
    }
}

/// A spawned controller plus handles onto every collaborator.
pub struct Harness {
    controller: Option<Controller>,
    pub handle: ControllerHandle,
    pub host: Arc<SimulatedController>,
    pub store: Arc<MemoryPreferenceStore>,
    pub reporter: Arc<RecordingHealthReporter>,
    pub screen: Arc<ScreenStateCell>,
    pub unlock: Arc<UnlockRegistry>,
    pub wake_lock: Arc<TrackedWakeLock>,
    pub abort: Arc<RecordingAbort>,
}

impl Harness {
    /// Starts a controller with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::start(HarnessOptions::default())
    }

    /// Starts a controller from `options`.
    #[must_use]
    pub fn start(options: HarnessOptions) -> Self {
        let host = Arc::new(options.host);
        let store = Arc::new(MemoryPreferenceStore::with_preferences(options.preferences));
        let reporter = Arc::new(RecordingHealthReporter::default());
        let screen = Arc::new(ScreenStateCell::new(options.screen));
        let unlock = Arc::new(UnlockRegistry::new(TechMask::NONE));
        let wake_lock = Arc::new(TrackedWakeLock::new());
        let abort = Arc::new(RecordingAbort::default());

        let controller = ControllerBuilder::new(host.clone(), store.clone())
            .reporter(reporter.clone())
            .screen_source(screen.clone())
            .unlock(Some(unlock.clone() as Arc<dyn LockscreenUnlock>))
            .wake_lock(wake_lock.clone())
            .abort_action(abort.clone())
            .settings(options.settings)
            .spawn()
            .expect("controller should spawn");
        let handle = controller.handle();

        Self {
            controller: Some(controller),
            handle,
            host,
            store,
            reporter,
            screen,
            unlock,
            wake_lock,
            abort,
        }
    }

    /// Starts a controller and enables it.
    #[must_use]
    pub fn enabled() -> Self {
        let harness = Self::new();
        harness.handle.enable().expect("controller should enable");
        harness
    }

    /// Waits until every request queued on the routing worker so far has
    /// been handled.
    pub fn sync(&self) {
        self.handle
            .compute_routing_parameters()
            .expect("routing worker should answer");
    }

    /// Polls `condition` until it holds or `timeout` elapses.
    pub fn wait_until(&self, timeout: Duration, condition: impl Fn(&Self) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition(self) {
                return true;
            }
            thread::sleep(POLL_INTERVAL);
        }
        condition(self)
    }

    /// Last preferences written to the store.
    #[must_use]
    pub fn stored(&self) -> Preferences {
        self.store.snapshot().expect("preferences should be stored")
    }

    /// Shuts the controller down and joins its workers.
    pub fn shutdown(&mut self) -> Result<(), ControllerError> {
        match self.controller.take() {
            Some(controller) => controller.shutdown(),
            None => Ok(()),
        }
    }
}
