//! Derives the on-disk artefact paths the daemon owns.
//!
//! The state directory holds the persisted preference record and the crash
//! marker written when a watchdog fires. Both are small files; routing-table
//! bytes are never persisted.

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::Config;

const PREFERENCES_FILE: &str = "preferences.json";
const CRASH_MARKER_FILE: &str = "watchdog.crash";

/// Canonical paths for state written by the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    state_dir: Utf8PathBuf,
    preferences_path: Utf8PathBuf,
    crash_marker_path: Utf8PathBuf,
}

impl StatePaths {
    /// Derives paths from `dir` without touching the filesystem.
    #[must_use]
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        let state_dir: Utf8PathBuf = dir.into();
        Self {
            preferences_path: state_dir.join(PREFERENCES_FILE),
            crash_marker_path: state_dir.join(CRASH_MARKER_FILE),
            state_dir,
        }
    }

    /// Derives paths from the configuration and creates the state directory.
    ///
    /// # Errors
    ///
    /// Returns [`StatePathsError::StateDirectory`] when the directory cannot
    /// be created.
    pub fn prepare(config: &Config) -> Result<Self, StatePathsError> {
        let paths = Self::new(config.state_dir.clone());
        fs::create_dir_all(&paths.state_dir).map_err(|source| {
            StatePathsError::StateDirectory {
                path: paths.state_dir.clone(),
                source,
            }
        })?;
        Ok(paths)
    }

    /// Directory holding daemon state.
    #[must_use]
    pub fn state_dir(&self) -> &Utf8Path {
        &self.state_dir
    }

    /// Path of the persisted preference record.
    #[must_use]
    pub fn preferences_path(&self) -> &Utf8Path {
        &self.preferences_path
    }

    /// Path of the crash marker written by a firing watchdog.
    #[must_use]
    pub fn crash_marker_path(&self) -> &Utf8Path {
        &self.crash_marker_path
    }
}

/// Errors raised while preparing the state directory.
#[derive(Debug, Error)]
pub enum StatePathsError {
    /// The state directory could not be created.
    #[error("failed to create state directory {path}: {source}")]
    StateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
}
