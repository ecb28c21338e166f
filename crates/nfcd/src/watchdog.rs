//! Bounded-time guards around hardware operations.
//!
//! A [`Watchdog`] runs on its own short-lived thread. If the guarded operation
//! does not cancel it before the timeout, the watchdog runs its
//! [`AbortAction`] exactly once. Once fired, cancellation has no effect.

use std::fs;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use camino::Utf8PathBuf;
use tracing::{error, warn};

use crate::hal::DeviceHost;
use crate::wakelock::WakeLock;

const WATCHDOG_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::watchdog");

/// Action taken when a watchdog expires.
pub trait AbortAction: Send + Sync {
    /// Runs the abort sequence for the named watchdog.
    fn abort(&self, watchdog: &str);
}

/// How a guarded operation ended relative to its watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogOutcome {
    /// The operation finished first.
    Completed,
    /// The watchdog fired before the operation finished.
    Fired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Armed,
    Cancelled,
    Fired,
}

#[derive(Debug)]
struct Shared {
    phase: Mutex<Phase>,
    wake: Condvar,
}

impl Shared {
    fn phase(&self) -> std::sync::MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A named timeout with an abort action.
pub struct Watchdog {
    name: &'static str,
    timeout: Duration,
    action: Arc<dyn AbortAction>,
}

impl Watchdog {
    /// Builds an unarmed watchdog.
    pub fn new(name: &'static str, timeout: Duration, action: Arc<dyn AbortAction>) -> Self {
        Self {
            name,
            timeout,
            action,
        }
    }

    /// Arms the watchdog. Dropping the returned guard cancels it.
    pub fn start(self) -> WatchdogGuard {
        let shared = Arc::new(Shared {
            phase: Mutex::new(Phase::Armed),
            wake: Condvar::new(),
        });
        let thread_shared = Arc::clone(&shared);
        let Self {
            name,
            timeout,
            action,
        } = self;

        let spawned = thread::Builder::new()
            .name(format!("watchdog-{name}"))
            .spawn(move || run(&thread_shared, name, timeout, action.as_ref()));
        let handle = match spawned {
            Ok(handle) => Some(handle),
            Err(source) => {
                error!(
                    target: WATCHDOG_TARGET,
                    watchdog = name,
                    error = %source,
                    "failed to spawn watchdog thread; operation runs unguarded"
                );
                None
            }
        };

        WatchdogGuard {
            name,
            shared,
            handle,
        }
    }
}

fn run(shared: &Shared, name: &str, timeout: Duration, action: &dyn AbortAction) {
    let guard = shared.phase();
    let (mut phase, _) = shared
        .wake
        .wait_timeout_while(guard, timeout, |phase| *phase == Phase::Armed)
        .unwrap_or_else(PoisonError::into_inner);
    if *phase != Phase::Armed {
        return;
    }
    *phase = Phase::Fired;
    drop(phase);

    error!(
        target: WATCHDOG_TARGET,
        watchdog = name,
        timeout_ms = timeout.as_millis(),
        "watchdog triggered, aborting"
    );
    action.abort(name);
}

/// Armed watchdog owned by the operation it guards.
#[must_use = "dropping the guard cancels the watchdog immediately"]
pub struct WatchdogGuard {
    name: &'static str,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl WatchdogGuard {
    /// Name of the guarded operation.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the watchdog has already fired.
    #[must_use]
    pub fn has_fired(&self) -> bool {
        *self.shared.phase() == Phase::Fired
    }

    /// Disarms the watchdog and reports whether it fired first.
    pub fn cancel(mut self) -> WatchdogOutcome {
        self.disarm()
    }

    fn disarm(&mut self) -> WatchdogOutcome {
        let outcome = {
            let mut phase = self.shared.phase();
            if *phase == Phase::Armed {
                *phase = Phase::Cancelled;
            }
            match *phase {
                Phase::Fired => WatchdogOutcome::Fired,
                Phase::Armed | Phase::Cancelled => WatchdogOutcome::Completed,
            }
        };
        self.shared.wake.notify_all();
        let panicked = self
            .handle
            .take()
            .is_some_and(|handle| handle.join().is_err());
        if panicked {
            warn!(
                target: WATCHDOG_TARGET,
                watchdog = self.name,
                "watchdog thread panicked"
            );
        }
        outcome
    }
}

impl Drop for WatchdogGuard {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _outcome = self.disarm();
        }
    }
}

/// Production abort sequence.
///
/// Releases the wake lock, writes the crash marker, aborts the hardware
/// session, and finally terminates the process so its supervisor restarts it
/// against a freshly reset controller.
pub struct HardwareAbort {
    wake_lock: Arc<dyn WakeLock>,
    host: Arc<dyn DeviceHost>,
    crash_marker: Utf8PathBuf,
    terminate: bool,
}

impl HardwareAbort {
    /// Builds the abort sequence.
    pub fn new(
        wake_lock: Arc<dyn WakeLock>,
        host: Arc<dyn DeviceHost>,
        crash_marker: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            wake_lock,
            host,
            crash_marker: crash_marker.into(),
            terminate: true,
        }
    }

    /// Keeps the process alive after aborting the hardware session.
    #[must_use]
    pub const fn without_termination(mut self) -> Self {
        self.terminate = false;
        self
    }
}

impl AbortAction for HardwareAbort {
    fn abort(&self, watchdog: &str) {
        self.wake_lock.release();
        if let Err(source) = fs::write(&self.crash_marker, format!("{watchdog}\n")) {
            error!(
                target: WATCHDOG_TARGET,
                path = %self.crash_marker,
                error = %source,
                "failed to write crash marker"
            );
        }
        self.host.abort(watchdog);
        if self.terminate {
            std::process::abort();
        }
    }
}
