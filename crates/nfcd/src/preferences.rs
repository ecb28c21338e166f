//! Persisted controller preferences.
//!
//! Preferences form one small JSON document: the on/off and secure-mode
//! switches, the first-boot marker, the selected execution environment, and
//! one packed power-route record per routed category. Writes go through a
//! temporary file in the same directory and are renamed into place, so a
//! crash never leaves a half-written document behind.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

use nfc_routing::{CategoryRoutes, ExecutionEnvironment, PowerRouteConfig, RouteCategory};

/// User and device preferences that survive restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Whether the controller should be on.
    pub nfc_on: bool,
    /// Whether secure mode is enabled.
    pub secure_nfc_on: bool,
    /// Cleared once first-boot initialisation has run.
    pub first_boot: bool,
    /// Set once the default payment preference has been recorded.
    pub payment_default_set: bool,
    /// Execution environment selected for routing, if any.
    pub secure_element: Option<ExecutionEnvironment>,
    /// Packed power-route records keyed by category preference key.
    pub routes: BTreeMap<String, u16>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            nfc_on: true,
            secure_nfc_on: false,
            first_boot: true,
            payment_default_set: false,
            secure_element: None,
            routes: BTreeMap::new(),
        }
    }
}

impl Preferences {
    /// Stored route for `category`, if one was persisted and decodes.
    #[must_use]
    pub fn route(&self, category: RouteCategory) -> Option<PowerRouteConfig> {
        self.routes
            .get(category.preference_key())
            .copied()
            .and_then(PowerRouteConfig::unpack)
    }

    /// Stores `route` for `category`.
    pub fn set_route(&mut self, category: RouteCategory, route: PowerRouteConfig) {
        self.routes
            .insert(category.preference_key().to_owned(), category.pack(route));
    }

    /// Stored routes for every category.
    #[must_use]
    pub fn stored_routes(&self) -> CategoryRoutes<Option<PowerRouteConfig>> {
        CategoryRoutes::from_fn(|category| self.route(category))
    }
}

/// Errors raised while loading or saving preferences.
#[derive(Debug, Error)]
pub enum PreferenceError {
    /// The preference file could not be read.
    #[error("failed to read preferences from {path}: {source}")]
    Read {
        /// Preference file path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The preference file could not be written.
    #[error("failed to write preferences to {path}: {source}")]
    Write {
        /// Preference file path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The preference document was not valid JSON.
    #[error("failed to parse preferences in {path}: {source}")]
    Parse {
        /// Preference file path.
        path: Utf8PathBuf,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// The preference document could not be serialised.
    #[error("failed to serialise preferences: {0}")]
    Serialise(#[source] serde_json::Error),
}

/// Storage backend for [`Preferences`].
pub trait PreferenceStore: Send + Sync {
    /// Loads stored preferences, falling back to defaults when none exist.
    fn load(&self) -> Result<Preferences, PreferenceError>;

    /// Replaces the stored preferences.
    fn save(&self, preferences: &Preferences) -> Result<(), PreferenceError>;
}

/// Preference store backed by a JSON file.
#[derive(Debug, Clone)]
pub struct JsonPreferenceStore {
    path: Utf8PathBuf,
}

impl JsonPreferenceStore {
    /// Builds a store writing to `path`.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the preference file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn write_error(&self, source: io::Error) -> PreferenceError {
        PreferenceError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

impl PreferenceStore for JsonPreferenceStore {
    fn load(&self) -> Result<Preferences, PreferenceError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Ok(Preferences::default());
            }
            Err(source) => {
                return Err(PreferenceError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_str(&text).map_err(|source| PreferenceError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, preferences: &Preferences) -> Result<(), PreferenceError> {
        let body = serde_json::to_vec_pretty(preferences).map_err(PreferenceError::Serialise)?;
        let directory = self
            .path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let mut file = NamedTempFile::new_in(directory).map_err(|error| self.write_error(error))?;
        file.write_all(&body)
            .and_then(|()| file.as_file().sync_all())
            .map_err(|error| self.write_error(error))?;
        file.persist(&self.path)
            .map_err(|error| self.write_error(error.error))?;
        Ok(())
    }
}

/// Preference store held in memory.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    stored: Mutex<Option<Preferences>>,
}

impl MemoryPreferenceStore {
    /// Builds a store that starts out holding `preferences`.
    #[must_use]
    pub const fn with_preferences(preferences: Preferences) -> Self {
        Self {
            stored: Mutex::new(Some(preferences)),
        }
    }

    /// Last saved preferences, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<Preferences> {
        self.stored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self) -> Result<Preferences, PreferenceError> {
        Ok(self.snapshot().unwrap_or_default())
    }

    fn save(&self, preferences: &Preferences) -> Result<(), PreferenceError> {
        *self.stored.lock().unwrap_or_else(PoisonError::into_inner) = Some(preferences.clone());
        Ok(())
    }
}
