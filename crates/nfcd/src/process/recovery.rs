//! Crash-marker handling for restarts after a watchdog abort.

use std::fs;
use std::io;

use camino::Utf8Path;
use tracing::{info, warn};

use super::PROCESS_TARGET;

/// Reports and clears the marker left by a watchdog that aborted the previous
/// run. Returns the name of the watchdog that fired, if any.
pub(super) fn take_crash_marker(path: &Utf8Path) -> Option<String> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return None,
        Err(error) => {
            warn!(target: PROCESS_TARGET, %path, %error, "crash marker unreadable");
            return None;
        }
    };
    let watchdog = contents.trim().to_owned();
    warn!(
        target: PROCESS_TARGET,
        %watchdog,
        "previous run was aborted by a watchdog"
    );
    match fs::remove_file(path) {
        Ok(()) => info!(target: PROCESS_TARGET, %path, "crash marker cleared"),
        Err(error) => warn!(target: PROCESS_TARGET, %path, %error, "crash marker not cleared"),
    }
    Some(watchdog)
}
