//! Supervises daemon launch sequencing and runtime orchestration.

use std::sync::Arc;

use tracing::{info, warn};

use crate::StructuredHealthReporter;
use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::controller::BootContext;
use crate::hal::DeviceHost;
use crate::health::HealthReporter;
use crate::simulator::SimulatedController;

use super::errors::LaunchError;
use super::recovery::take_crash_marker;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};
use super::PROCESS_TARGET;

/// Collaborators required to launch the daemon runtime.
pub(crate) struct LaunchPlan<L, S> {
    pub(crate) loader: L,
    pub(crate) reporter: Arc<dyn HealthReporter>,
    pub(crate) shutdown: S,
    pub(crate) host: Arc<dyn DeviceHost>,
    pub(crate) boot: BootContext,
}

/// Runs the daemon using the production collaborators.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap, controller startup, or shutdown
/// handling fails.
pub fn run_daemon() -> Result<(), LaunchError> {
    let plan = LaunchPlan {
        loader: SystemConfigLoader,
        reporter: Arc::new(StructuredHealthReporter::new()),
        shutdown: SystemShutdownSignal::new(),
        host: Arc::new(SimulatedController::new()),
        boot: BootContext::default(),
    };
    run_daemon_with(plan)
}

/// Runs the daemon with injected collaborators.
pub(crate) fn run_daemon_with<L, S>(plan: LaunchPlan<L, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal,
{
    let LaunchPlan {
        loader,
        reporter,
        shutdown,
        host,
        boot,
    } = plan;

    let daemon = bootstrap_with(&loader, reporter)?;
    info!(
        target: PROCESS_TARGET,
        state_dir = %daemon.paths().state_dir(),
        "starting daemon runtime"
    );
    if let Some(watchdog) = take_crash_marker(daemon.paths().crash_marker_path()) {
        info!(target: PROCESS_TARGET, %watchdog, "recovering from watchdog abort");
    }

    let controller = daemon.start_controller(host)?;
    if let Err(error) = controller.handle().boot(boot) {
        warn!(target: PROCESS_TARGET, %error, "controller boot failed; staying off");
    }

    let waited = shutdown.wait();
    info!(target: PROCESS_TARGET, "stopping controller");
    let stopped = controller.shutdown();
    waited?;
    stopped?;
    info!(target: PROCESS_TARGET, "daemon stopped");
    Ok(())
}
