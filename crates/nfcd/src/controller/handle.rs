//! Public entry points into the controller workers.

use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use camino::Utf8PathBuf;

use nfc_config::StatePaths;
use nfc_routing::{
    ExecutionEnvironment, PowerFlags, RouteCategory, RoutingPlan, RoutingTableSnapshot,
};
use tracing::{debug, error, info};

use super::routing::ApplyOutcome;
use super::state::{Collaborators, Core, LIFECYCLE_TARGET};
use super::worker::{
    LifecycleCommand, Reply, RoutingCommand, RoutingWorker, Transition, run_lifecycle,
};
use super::{BootContext, ControllerError, ControllerSettings, ControllerState};
use crate::discovery::{DiscoveryParameters, ReaderModeRequest};
use crate::hal::{DeviceHost, HalEvent};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::preferences::{PreferenceStore, Preferences};
use crate::screen::{ScreenState, ScreenStateCell, ScreenStateSource};
use crate::unlock::LockscreenUnlock;
use crate::wakelock::{TrackedWakeLock, WakeLock};
use crate::watchdog::{AbortAction, HardwareAbort};

const LIFECYCLE_WORKER: &str = "lifecycle";
const ROUTING_WORKER: &str = "routing";

/// Assembles a [`Controller`] from its collaborators.
pub struct ControllerBuilder {
    host: Arc<dyn DeviceHost>,
    store: Arc<dyn PreferenceStore>,
    reporter: Arc<dyn HealthReporter>,
    screen_source: Arc<dyn ScreenStateSource>,
    unlock: Option<Arc<dyn LockscreenUnlock>>,
    wake_lock: Arc<dyn WakeLock>,
    abort: Option<Arc<dyn AbortAction>>,
    crash_marker: Option<Utf8PathBuf>,
    settings: ControllerSettings,
}

impl ControllerBuilder {
    /// Starts a builder for `host`, persisting preferences in `store`.
    pub fn new(host: Arc<dyn DeviceHost>, store: Arc<dyn PreferenceStore>) -> Self {
        Self {
            host,
            store,
            reporter: Arc::new(StructuredHealthReporter::new()),
            screen_source: Arc::new(ScreenStateCell::new(ScreenState::OnUnlocked)),
            unlock: None,
            wake_lock: Arc::new(TrackedWakeLock::new()),
            abort: None,
            crash_marker: None,
            settings: ControllerSettings::default(),
        }
    }

    /// Observer for state changes and table-full conditions.
    #[must_use]
    pub fn reporter(mut self, reporter: Arc<dyn HealthReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Source sampled for the screen state when the controller comes up.
    #[must_use]
    pub fn screen_source(mut self, source: Arc<dyn ScreenStateSource>) -> Self {
        self.screen_source = source;
        self
    }

    /// Lock-screen unlock capability; `None` when the device lacks it.
    #[must_use]
    pub fn unlock(mut self, unlock: Option<Arc<dyn LockscreenUnlock>>) -> Self {
        self.unlock = unlock;
        self
    }

    /// Wake lock held across init, deinit, and routing commits.
    #[must_use]
    pub fn wake_lock(mut self, wake_lock: Arc<dyn WakeLock>) -> Self {
        self.wake_lock = wake_lock;
        self
    }

    /// Action run when a watchdog expires.
    ///
    /// Defaults to [`HardwareAbort`], writing the crash marker configured via
    /// [`ControllerBuilder::crash_marker`].
    #[must_use]
    pub fn abort_action(mut self, abort: Arc<dyn AbortAction>) -> Self {
        self.abort = Some(abort);
        self
    }

    /// File written by the default abort action.
    #[must_use]
    pub fn crash_marker(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.crash_marker = Some(path.into());
        self
    }

    /// Timeouts and device capabilities.
    #[must_use]
    pub const fn settings(mut self, settings: ControllerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Loads preferences and starts both workers.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Preferences`] when stored preferences cannot
    /// be read and [`ControllerError::WorkerSpawn`] when a worker thread
    /// cannot be started.
    pub fn spawn(self) -> Result<Controller, ControllerError> {
        let preferences = self.store.load()?;
        let wake_lock = self.wake_lock;
        let host = self.host;
        let crash_marker = self.crash_marker;
        let abort = self.abort.unwrap_or_else(|| {
            let marker = crash_marker.unwrap_or_else(|| {
                StatePaths::new(nfc_config::default_state_dir())
                    .crash_marker_path()
                    .to_owned()
            });
            Arc::new(HardwareAbort::new(
                Arc::clone(&wake_lock),
                Arc::clone(&host),
                marker,
            ))
        });
        let core = Arc::new(Core::new(
            Collaborators {
                host,
                store: self.store,
                reporter: self.reporter,
                screen_source: self.screen_source,
                unlock: self.unlock,
                wake_lock,
                abort,
            },
            self.settings,
            preferences,
        ));

        let (lifecycle_tx, lifecycle_rx) = mpsc::channel();
        let (routing_tx, routing_rx) = mpsc::channel();

        let lifecycle_core = Arc::clone(&core);
        let lifecycle = thread::Builder::new()
            .name("nfcd-lifecycle".to_owned())
            .spawn(move || run_lifecycle(&lifecycle_core, &lifecycle_rx))
            .map_err(|source| ControllerError::WorkerSpawn {
                worker: LIFECYCLE_WORKER,
                source,
            })?;

        let worker = RoutingWorker::new(Arc::clone(&core));
        let routing = match thread::Builder::new()
            .name("nfcd-routing".to_owned())
            .spawn(move || worker.run(&routing_rx))
        {
            Ok(handle) => handle,
            Err(source) => {
                if lifecycle_tx.send(LifecycleCommand::Stop).is_ok() && lifecycle.join().is_err() {
                    error!(target: LIFECYCLE_TARGET, "lifecycle worker panicked during startup");
                }
                return Err(ControllerError::WorkerSpawn {
                    worker: ROUTING_WORKER,
                    source,
                });
            }
        };

        Ok(Controller {
            handle: ControllerHandle {
                core,
                lifecycle: lifecycle_tx,
                routing: routing_tx,
            },
            workers: Some(Workers { lifecycle, routing }),
        })
    }
}

struct Workers {
    lifecycle: JoinHandle<()>,
    routing: JoinHandle<()>,
}

/// Running controller. Dropping it stops the workers without powering the
/// hardware down; call [`Controller::shutdown`] for an orderly stop.
pub struct Controller {
    handle: ControllerHandle,
    workers: Option<Workers>,
}

impl Controller {
    /// Clonable handle for issuing requests from any thread.
    #[must_use]
    pub fn handle(&self) -> ControllerHandle {
        self.handle.clone()
    }

    /// Disables the controller without touching the on/off preference, then
    /// stops both workers.
    ///
    /// # Errors
    ///
    /// Returns the disable failure, or [`ControllerError::WorkerPanicked`]
    /// when a worker thread panicked.
    pub fn shutdown(mut self) -> Result<(), ControllerError> {
        let disabled = self
            .handle
            .transition(Transition::Disable { persist: false });
        info!(target: LIFECYCLE_TARGET, "controller shutting down");
        self.stop_workers()?;
        disabled
    }

    fn stop_workers(&mut self) -> Result<(), ControllerError> {
        let Some(workers) = self.workers.take() else {
            return Ok(());
        };
        // A closed channel means the worker has already exited.
        if self.handle.lifecycle.send(LifecycleCommand::Stop).is_err() {
            debug!(target: LIFECYCLE_TARGET, "lifecycle worker already stopped");
        }
        if self.handle.routing.send(RoutingCommand::Stop).is_err() {
            debug!(target: LIFECYCLE_TARGET, "routing worker already stopped");
        }
        let lifecycle_joined = workers.lifecycle.join().is_ok();
        let routing_joined = workers.routing.join().is_ok();
        if !lifecycle_joined {
            return Err(ControllerError::WorkerPanicked {
                worker: LIFECYCLE_WORKER,
            });
        }
        if !routing_joined {
            return Err(ControllerError::WorkerPanicked {
                worker: ROUTING_WORKER,
            });
        }
        Ok(())
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Err(error) = self.stop_workers() {
            error!(target: LIFECYCLE_TARGET, %error, "controller workers did not stop cleanly");
        }
    }
}

/// Injects hardware events into the routing worker.
#[derive(Clone)]
pub struct EventSink {
    routing: Sender<RoutingCommand>,
}

impl EventSink {
    /// Queues `event` for the routing worker.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::WorkerUnavailable`] once the controller has
    /// stopped.
    pub fn deliver(&self, event: HalEvent) -> Result<(), ControllerError> {
        self.routing
            .send(RoutingCommand::Hardware(event))
            .map_err(|_| ControllerError::WorkerUnavailable {
                worker: ROUTING_WORKER,
            })
    }
}

/// Clonable request handle for a running [`Controller`].
#[derive(Clone)]
pub struct ControllerHandle {
    core: Arc<Core>,
    lifecycle: Sender<LifecycleCommand>,
    routing: Sender<RoutingCommand>,
}

impl ControllerHandle {
    /// Current controller state.
    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.core.state()
    }

    /// Whether the controller is fully on.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.state() == ControllerState::On
    }

    /// Powers the controller up and records the user's choice.
    ///
    /// The request queues behind any transition already submitted and sees
    /// the state left by it.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::TransitionRejected`] if the controller is
    /// turning off when the request runs, or the failure reported by the
    /// transition.
    pub fn enable(&self) -> Result<(), ControllerError> {
        self.transition(Transition::Enable { persist: true })
    }

    /// Powers the controller down and records the user's choice.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::TransitionRejected`] if the controller is
    /// turning on when the request runs, or the failure reported by the
    /// transition.
    pub fn disable(&self) -> Result<(), ControllerError> {
        self.transition(Transition::Disable { persist: true })
    }

    /// Powers the controller up after a low-power exit.
    ///
    /// # Errors
    ///
    /// Returns the failure reported by the transition.
    pub fn enable_for_low_power_exit(&self) -> Result<(), ControllerError> {
        self.transition(Transition::EnableForLowPowerExit)
    }

    /// Runs process-start initialisation.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::TransitionRejected`] on a second call, or
    /// the failure of the enable it triggers.
    pub fn boot(&self, context: BootContext) -> Result<(), ControllerError> {
        self.transition(Transition::Boot(context))
    }

    /// Disables and re-enables the controller.
    ///
    /// # Errors
    ///
    /// Returns the first failing step.
    pub fn restart(&self) -> Result<(), ControllerError> {
        self.transition(Transition::Restart)
    }

    fn transition(&self, transition: Transition) -> Result<(), ControllerError> {
        let (reply, response) = mpsc::channel();
        self.lifecycle
            .send(LifecycleCommand::Run { transition, reply })
            .map_err(|_| ControllerError::WorkerUnavailable {
                worker: LIFECYCLE_WORKER,
            })?;
        response
            .recv()
            .map_err(|_| ControllerError::WorkerUnavailable {
                worker: LIFECYCLE_WORKER,
            })?
    }

    fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> RoutingCommand,
    ) -> Result<T, ControllerError> {
        let (reply, response) = mpsc::channel();
        self.routing
            .send(command(reply))
            .map_err(|_| ControllerError::WorkerUnavailable {
                worker: ROUTING_WORKER,
            })?;
        response
            .recv()
            .map_err(|_| ControllerError::WorkerUnavailable {
                worker: ROUTING_WORKER,
            })?
    }

    fn call<T>(
        &self,
        job: impl FnOnce(&Core) -> Result<T, ControllerError> + Send + 'static,
    ) -> Result<T, ControllerError>
    where
        T: Send + 'static,
    {
        self.request(|reply: Reply<T>| {
            RoutingCommand::Call(Box::new(move |core: &Core| {
                if reply.send(job(core)).is_err() {
                    debug!(target: LIFECYCLE_TARGET, "caller stopped waiting for reply");
                }
            }))
        })
    }

    fn notify(&self, command: RoutingCommand) -> Result<(), ControllerError> {
        self.routing
            .send(command)
            .map_err(|_| ControllerError::WorkerUnavailable {
                worker: ROUTING_WORKER,
            })
    }

    /// Recomputes discovery and reprograms it when changed or forced.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::WatchdogTimeout`] when the controller hangs.
    pub fn apply_routing(&self, force: bool) -> Result<ApplyOutcome, ControllerError> {
        self.request(|reply| RoutingCommand::ApplyRouting { force, reply })
    }

    /// Computes the routing plan from preferences and hardware defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::WorkerUnavailable`] once stopped.
    pub fn compute_routing_parameters(&self) -> Result<RoutingPlan, ControllerError> {
        self.call(|core| Ok(core.compute_routing_plan()))
    }

    /// Stages and commits the current routing plan.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::HardwareCallFailed`] when staging or the
    /// commit fails.
    pub fn commit_routing(&self) -> Result<Arc<RoutingTableSnapshot>, ControllerError> {
        self.call(Core::reprogram_routing)
    }

    /// Moves the default AID route to `target` and persists it.
    ///
    /// # Errors
    ///
    /// Returns the persistence or programming failure.
    pub fn update_default_aid_route(
        &self,
        target: ExecutionEnvironment,
    ) -> Result<(), ControllerError> {
        self.call(move |core| core.update_default_aid_route(target))
    }

    /// Persists a route for `category` built from user power flags.
    ///
    /// # Errors
    ///
    /// Returns the persistence or programming failure.
    pub fn set_power_route(
        &self,
        category: RouteCategory,
        target: ExecutionEnvironment,
        flags: PowerFlags,
    ) -> Result<(), ControllerError> {
        self.call(move |core| core.set_power_route(category, target, flags))
    }

    /// Routes default AID traffic to `target` until cleared.
    ///
    /// # Errors
    ///
    /// Returns the programming failure.
    pub fn set_overflow_route(&self, target: ExecutionEnvironment) -> Result<(), ControllerError> {
        self.request(|reply| RoutingCommand::SetOverflowRoute {
            target: Some(target),
            reply,
        })
    }

    /// Returns the default AID route to its persisted target.
    ///
    /// # Errors
    ///
    /// Returns the programming failure.
    pub fn clear_overflow_route(&self) -> Result<(), ControllerError> {
        self.request(|reply| RoutingCommand::SetOverflowRoute {
            target: None,
            reply,
        })
    }

    /// Current overflow override, if any.
    #[must_use]
    pub fn overflow_route(&self) -> Option<ExecutionEnvironment> {
        self.core.lock().overflow_route
    }

    /// Last routing table read back from the controller.
    #[must_use]
    pub fn routing_table_snapshot(&self) -> Arc<RoutingTableSnapshot> {
        Arc::clone(&self.core.lock().snapshot)
    }

    /// Cached preference record.
    #[must_use]
    pub fn preferences(&self) -> Preferences {
        self.core.preferences()
    }

    /// Discovery parameters last applied to the controller.
    #[must_use]
    pub fn discovery_parameters(&self) -> DiscoveryParameters {
        self.core.lock().discovery
    }

    /// Queues a screen-state change.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::WorkerUnavailable`] once stopped.
    pub fn on_screen_state_changed(&self, screen: ScreenState) -> Result<(), ControllerError> {
        self.notify(RoutingCommand::ScreenStateChanged(screen))
    }

    /// Queues a reader-mode registration or, with `None`, its removal.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::WorkerUnavailable`] once stopped.
    pub fn on_reader_mode_request_changed(
        &self,
        request: Option<ReaderModeRequest>,
    ) -> Result<(), ControllerError> {
        self.notify(RoutingCommand::ReaderModeChanged(request))
    }

    /// Records whether provisioning is in progress and re-evaluates discovery.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::WorkerUnavailable`] once stopped.
    pub fn set_provisioning_mode(&self, provisioning: bool) -> Result<(), ControllerError> {
        self.core.set_provisioning_mode(provisioning);
        self.notify(RoutingCommand::ContextChanged)
    }

    /// Persists the secure-mode preference and re-evaluates discovery.
    ///
    /// # Errors
    ///
    /// Returns the persistence failure.
    pub fn set_secure_mode(&self, secure: bool) -> Result<(), ControllerError> {
        self.core.set_secure_mode(secure)?;
        self.notify(RoutingCommand::ContextChanged)
    }

    /// Re-evaluates discovery after unlock registrations changed.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::WorkerUnavailable`] once stopped.
    pub fn on_lockscreen_unlock_changed(&self) -> Result<(), ControllerError> {
        self.notify(RoutingCommand::ContextChanged)
    }

    /// Stops polling for `duration`, after which it resumes automatically.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::InvalidPollingPause`] for a zero or
    /// oversized duration and [`ControllerError::TransitionRejected`] while
    /// the controller is not on.
    pub fn pause_polling(&self, duration: Duration) -> Result<(), ControllerError> {
        let max = self.core.settings.max_polling_pause;
        if duration.is_zero() || duration > max {
            return Err(ControllerError::InvalidPollingPause {
                requested: duration,
                max,
            });
        }
        self.request(|reply| RoutingCommand::PausePolling { duration, reply })
    }

    /// Resumes polling before a pause lapses.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::WatchdogTimeout`] when the controller hangs.
    pub fn resume_polling(&self) -> Result<ApplyOutcome, ControllerError> {
        self.request(|reply| RoutingCommand::ResumePolling { reply })
    }

    /// Selects `environment` for off-host routing.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::UnknownExecutionEnvironment`] when it is not
    /// attached and [`ControllerError::HardwareCallFailed`] when selection
    /// fails.
    pub fn select_execution_environment(
        &self,
        environment: ExecutionEnvironment,
    ) -> Result<(), ControllerError> {
        self.call(move |core| core.select_execution_environment(environment))
    }

    /// Deselects the persisted execution environment.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::HardwareCallFailed`] when deselection fails.
    pub fn deselect_execution_environment(&self) -> Result<(), ControllerError> {
        self.call(Core::deselect_execution_environment)
    }

    /// Sink for hardware events.
    #[must_use]
    pub fn event_sink(&self) -> EventSink {
        EventSink {
            routing: self.routing.clone(),
        }
    }
}
