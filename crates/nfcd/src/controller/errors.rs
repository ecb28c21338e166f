//! Errors raised by controller requests.

use std::fmt;
use std::time::Duration;

use nfc_routing::ExecutionEnvironment;
use thiserror::Error;

use super::ControllerState;
use crate::hal::HardwareCall;
use crate::preferences::PreferenceError;

/// Operation named when a request is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Power the controller up.
    Enable,
    /// Power the controller up after low-power mode.
    EnableForLowPowerExit,
    /// Power the controller down.
    Disable,
    /// Process-start initialisation.
    Boot,
    /// Disable followed by enable.
    Restart,
    /// Discovery reprogramming.
    ApplyRouting,
    /// Routing-table commit.
    CommitRouting,
    /// Temporary polling suspension.
    PausePolling,
    /// Execution-environment selection.
    SelectExecutionEnvironment,
}

impl Operation {
    /// Stable label used in logs and errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::EnableForLowPowerExit => "enable_for_low_power_exit",
            Self::Disable => "disable",
            Self::Boot => "boot",
            Self::Restart => "restart",
            Self::ApplyRouting => "apply_routing",
            Self::CommitRouting => "commit_routing",
            Self::PausePolling => "pause_polling",
            Self::SelectExecutionEnvironment => "select_execution_environment",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by controller operations.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The operation is not valid in the current state.
    #[error("cannot {operation} while the controller is {state}")]
    TransitionRejected {
        /// Rejected operation.
        operation: Operation,
        /// State observed when the request was checked.
        state: ControllerState,
    },
    /// A hardware call reported failure.
    #[error("hardware call {call} failed")]
    HardwareCallFailed {
        /// Failing call.
        call: HardwareCall,
    },
    /// A guarded operation overran its watchdog.
    #[error("watchdog {watchdog} expired")]
    WatchdogTimeout {
        /// Name of the expired watchdog.
        watchdog: &'static str,
    },
    /// A polling pause was zero or exceeded the configured maximum.
    #[error("polling pause of {requested:?} is outside the accepted range (max {max:?})")]
    InvalidPollingPause {
        /// Requested pause.
        requested: Duration,
        /// Largest accepted pause.
        max: Duration,
    },
    /// The requested execution environment is not attached.
    #[error("execution environment {environment} is not attached")]
    UnknownExecutionEnvironment {
        /// Requested environment.
        environment: ExecutionEnvironment,
    },
    /// Preferences could not be persisted.
    #[error(transparent)]
    Preferences(#[from] PreferenceError),
    /// A worker thread could not be spawned.
    #[error("failed to spawn {worker} worker: {source}")]
    WorkerSpawn {
        /// Worker name.
        worker: &'static str,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// A worker thread has stopped.
    #[error("{worker} worker is not running")]
    WorkerUnavailable {
        /// Worker name.
        worker: &'static str,
    },
    /// A worker thread panicked.
    #[error("{worker} worker panicked")]
    WorkerPanicked {
        /// Worker name.
        worker: &'static str,
    },
}
