//! Lifecycle and routing worker threads.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use nfc_routing::ExecutionEnvironment;
use tracing::{debug, warn};

use super::routing::{ApplyOutcome, Gate};
use super::state::{Core, LIFECYCLE_TARGET};
use super::{BootContext, ControllerError, Operation};
use crate::discovery::ReaderModeRequest;
use crate::hal::HalEvent;
use crate::screen::ScreenState;

const WORKER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::worker");

/// Reply channel carried by request/response commands.
pub(super) type Reply<T> = Sender<Result<T, ControllerError>>;

/// Job executed on the routing worker with access to the core.
pub(super) type RoutingJob = Box<dyn FnOnce(&Core) + Send>;

fn send_reply<T>(reply: &Reply<T>, result: Result<T, ControllerError>) {
    if reply.send(result).is_err() {
        debug!(target: WORKER_TARGET, "caller stopped waiting for reply");
    }
}

/// Power transitions accepted by the lifecycle worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Transition {
    Enable { persist: bool },
    EnableForLowPowerExit,
    Disable { persist: bool },
    Boot(BootContext),
    Restart,
}

pub(super) enum LifecycleCommand {
    Run {
        transition: Transition,
        reply: Reply<()>,
    },
    Stop,
}

pub(super) fn run_lifecycle(core: &Core, commands: &Receiver<LifecycleCommand>) {
    for command in commands {
        match command {
            LifecycleCommand::Run { transition, reply } => {
                debug!(target: LIFECYCLE_TARGET, ?transition, "running transition");
                let result = run_transition(core, transition);
                if let Err(error) = &result {
                    warn!(target: LIFECYCLE_TARGET, ?transition, %error, "transition failed");
                }
                send_reply(&reply, result);
            }
            LifecycleCommand::Stop => break,
        }
    }
    debug!(target: LIFECYCLE_TARGET, "lifecycle worker stopped");
}

fn run_transition(core: &Core, transition: Transition) -> Result<(), ControllerError> {
    match transition {
        Transition::Enable { persist } => {
            if persist {
                core.persist_enabled(true)?;
            }
            core.enable(Operation::Enable)
        }
        Transition::EnableForLowPowerExit => core.enable(Operation::EnableForLowPowerExit),
        Transition::Disable { persist } => {
            if persist {
                core.persist_enabled(false)?;
            }
            core.disable()
        }
        Transition::Boot(context) => core.boot(context),
        Transition::Restart => core.restart(),
    }
}

/// Messages consumed by the routing worker.
pub(super) enum RoutingCommand {
    ScreenStateChanged(ScreenState),
    ReaderModeChanged(Option<ReaderModeRequest>),
    ContextChanged,
    ApplyRouting {
        force: bool,
        reply: Reply<ApplyOutcome>,
    },
    PausePolling {
        duration: Duration,
        reply: Reply<()>,
    },
    ResumePolling {
        reply: Reply<ApplyOutcome>,
    },
    SetOverflowRoute {
        target: Option<ExecutionEnvironment>,
        reply: Reply<()>,
    },
    Hardware(HalEvent),
    Call(RoutingJob),
    Stop,
}

#[derive(Debug, Clone, Copy)]
struct Timer {
    deadline: Instant,
    generation: u64,
}

#[derive(Debug, Clone, Copy)]
struct RetryTimer {
    timer: Timer,
    force: bool,
}

/// Cancellable delayed actions owned by the routing worker.
#[derive(Debug, Default)]
struct Timers {
    resume_polling: Option<Timer>,
    routing_retry: Option<RetryTimer>,
}

impl Timers {
    fn next_deadline(&self) -> Option<Instant> {
        let resume = self.resume_polling.map(|timer| timer.deadline);
        let retry = self.routing_retry.map(|retry| retry.timer.deadline);
        match (resume, retry) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (deadline, None) | (None, deadline) => deadline,
        }
    }
}

pub(super) struct RoutingWorker {
    core: Arc<Core>,
    timers: Timers,
}

impl RoutingWorker {
    pub(super) fn new(core: Arc<Core>) -> Self {
        Self {
            core,
            timers: Timers::default(),
        }
    }

    pub(super) fn run(mut self, commands: &Receiver<RoutingCommand>) {
        loop {
            let received = match self.timers.next_deadline() {
                Some(deadline) => {
                    match commands.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                        Ok(command) => Some(command),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match commands.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                },
            };
            match received {
                Some(RoutingCommand::Stop) => break,
                Some(command) => self.handle(command),
                None => self.fire_due_timers(),
            }
        }
        debug!(target: WORKER_TARGET, "routing worker stopped");
    }

    fn handle(&mut self, command: RoutingCommand) {
        match command {
            RoutingCommand::ScreenStateChanged(screen) => {
                self.cancel_timers();
                let result = self.core.on_screen_state_changed(screen);
                self.after_apply(&result, false);
            }
            RoutingCommand::ReaderModeChanged(request) => {
                self.cancel_timers();
                let result = self.core.on_reader_mode_changed(request);
                self.after_apply(&result, false);
            }
            RoutingCommand::ContextChanged => {
                self.cancel_timers();
                let result = self.core.apply_routing(false, Gate::Enforce);
                self.after_apply(&result, false);
            }
            RoutingCommand::ApplyRouting { force, reply } => {
                let result = self.core.apply_routing(force, Gate::Enforce);
                self.after_apply(&result, force);
                send_reply(&reply, result);
            }
            RoutingCommand::PausePolling { duration, reply } => {
                let result = self.core.pause_polling();
                if result.is_ok() {
                    self.timers.resume_polling = Some(self.timer_after(duration));
                }
                send_reply(&reply, result);
            }
            RoutingCommand::ResumePolling { reply } => {
                self.timers.resume_polling = None;
                send_reply(&reply, self.core.resume_polling());
            }
            RoutingCommand::SetOverflowRoute { target, reply } => {
                send_reply(&reply, self.core.set_overflow_route(target));
            }
            RoutingCommand::Hardware(event) => {
                if let Err(error) = self.core.on_hal_event(event) {
                    warn!(target: WORKER_TARGET, ?event, %error, "hardware event handling failed");
                }
            }
            RoutingCommand::Call(job) => job(&self.core),
            RoutingCommand::Stop => {}
        }
    }

    /// Drops pending timers. A lapsed pause is lifted so the following
    /// evaluation can turn discovery back on.
    fn cancel_timers(&mut self) {
        if self.timers.resume_polling.take().is_some() && self.core.clear_polling_pause() {
            debug!(target: WORKER_TARGET, "polling pause cancelled by context change");
        }
        if self.timers.routing_retry.take().is_some() {
            debug!(target: WORKER_TARGET, "routing retry cancelled by context change");
        }
    }

    fn timer_after(&self, delay: Duration) -> Timer {
        Timer {
            deadline: Instant::now() + delay,
            generation: self.core.timer_generation(),
        }
    }

    fn after_apply(&mut self, result: &Result<ApplyOutcome, ControllerError>, force: bool) {
        match result {
            Ok(ApplyOutcome::Deferred) => {
                let delay = self.core.settings.routing_retry_delay;
                debug!(
                    target: WORKER_TARGET,
                    delay_ms = delay.as_millis(),
                    "routing retry scheduled"
                );
                self.timers.routing_retry = Some(RetryTimer {
                    timer: self.timer_after(delay),
                    force,
                });
            }
            Ok(_) => {}
            Err(error) => warn!(target: WORKER_TARGET, %error, "apply routing failed"),
        }
    }

    fn fire_due_timers(&mut self) {
        let now = Instant::now();
        let generation = self.core.timer_generation();

        if let Some(timer) = self.timers.resume_polling.filter(|timer| timer.deadline <= now) {
            self.timers.resume_polling = None;
            if timer.generation != generation {
                debug!(target: WORKER_TARGET, "polling resume lapsed after disable");
            } else if let Err(error) = self.core.resume_polling() {
                warn!(target: WORKER_TARGET, %error, "resume polling failed");
            }
        }

        if let Some(retry) = self.timers.routing_retry.filter(|retry| retry.timer.deadline <= now) {
            self.timers.routing_retry = None;
            if retry.timer.generation != generation {
                debug!(target: WORKER_TARGET, "routing retry lapsed after disable");
                return;
            }
            match self.core.apply_routing(retry.force, Gate::Enforce) {
                Ok(ApplyOutcome::Deferred) => warn!(
                    target: WORKER_TARGET,
                    "tag still connected after retry; routing left unchanged"
                ),
                Ok(_) => {}
                Err(error) => warn!(target: WORKER_TARGET, %error, "routing retry failed"),
            }
        }
    }
}
