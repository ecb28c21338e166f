//! Abort action that records expiries instead of terminating the process.

use std::sync::Mutex;

use crate::watchdog::AbortAction;

/// Collects the names of watchdogs that fired.
#[derive(Debug, Default)]
pub struct RecordingAbort {
    fired: Mutex<Vec<String>>,
}

impl RecordingAbort {
    /// Watchdogs that fired, oldest first.
    #[must_use]
    pub fn fired(&self) -> Vec<String> {
        self.fired.lock().expect("abort mutex poisoned").clone()
    }
}

impl AbortAction for RecordingAbort {
    fn abort(&self, watchdog: &str) {
        self.fired
            .lock()
            .expect("abort mutex poisoned")
            .push(watchdog.to_owned());
    }
}
