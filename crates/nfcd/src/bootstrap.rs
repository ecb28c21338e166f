//! Daemon bootstrap orchestration.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use nfc_config::{Config, StatePaths, StatePathsError};

use crate::controller::{Controller, ControllerBuilder, ControllerError, ControllerSettings};
use crate::hal::DeviceHost;
use crate::health::HealthReporter;
use crate::preferences::JsonPreferenceStore;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

impl<T> ConfigLoader for &T
where
    T: ConfigLoader + ?Sized,
{
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        (**self).load()
    }
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a configuration resolved ahead of time.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The state directory could not be prepared.
    #[error("failed to prepare state directory: {source}")]
    StateDirectory {
        /// Filesystem error reported while creating the directory.
        #[source]
        source: StatePathsError,
    },
}

/// Result of a successful bootstrap invocation.
pub struct Daemon {
    config: Config,
    paths: StatePaths,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Paths of the files the daemon persists.
    #[must_use]
    pub const fn paths(&self) -> &StatePaths {
        &self.paths
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Starts a controller for `host` backed by the on-disk preference
    /// record and wired to the daemon's health reporter.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError`] when preferences cannot be read or the
    /// workers cannot be spawned.
    pub fn start_controller(&self, host: Arc<dyn DeviceHost>) -> Result<Controller, ControllerError> {
        let store = Arc::new(JsonPreferenceStore::new(self.paths.preferences_path()));
        ControllerBuilder::new(host, store)
            .reporter(Arc::clone(&self.reporter))
            .crash_marker(self.paths.crash_marker_path())
            .settings(ControllerSettings::from(&self.config))
            .spawn()
    }
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// # Errors
///
/// Returns [`BootstrapError`] when configuration, telemetry, or the state
/// directory cannot be set up. Each failure is also passed to `reporter`.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let paths = match StatePaths::prepare(&config) {
        Ok(paths) => paths,
        Err(source) => {
            let error = BootstrapError::StateDirectory { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    reporter.bootstrap_succeeded(&config);

    Ok(Daemon {
        config,
        paths,
        telemetry,
        reporter,
    })
}
