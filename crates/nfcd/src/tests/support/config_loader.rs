//! Test configuration loaders for scenarios covering success and failure paths.

use std::ffi::OsString;
use std::fs;
use std::sync::Arc;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoError};
use tempfile::TempDir;

use nfc_config::Config;

use crate::bootstrap::ConfigLoader;

fn utf8_dir(dir: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
        .expect("temporary directory was not valid UTF-8")
}

/// Loader that places daemon state under a temporary directory.
pub struct TestConfigLoader {
    state_dir: TempDir,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state_dir: TempDir::new().expect("failed to create temporary state directory"),
        }
    }

    /// Directory the loaded configuration points at.
    #[must_use]
    pub fn state_dir(&self) -> Utf8PathBuf {
        utf8_dir(&self.state_dir).join("nfcd")
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            state_dir: self.state_dir(),
            ..Config::default()
        })
    }
}

/// Loader that intentionally fails by passing an unparseable CLI value.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("nfcd"),
            OsString::from("--init-watchdog-ms"),
            OsString::from("soon"),
        ];
        Config::load_from_iter(args)
    }
}

/// Loader whose state directory sits beneath a regular file.
pub struct BlockedStateDirLoader {
    root: TempDir,
}

impl BlockedStateDirLoader {
    #[must_use]
    pub fn new() -> Self {
        let root = TempDir::new().expect("failed to create temporary directory");
        fs::write(root.path().join("occupied"), b"not a directory").expect("write blocker");
        Self { root }
    }
}

impl ConfigLoader for BlockedStateDirLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            state_dir: utf8_dir(&self.root).join("occupied").join("nfcd"),
            ..Config::default()
        })
    }
}
