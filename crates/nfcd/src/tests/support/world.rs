//! BDD test world: a running controller plus the results of the last steps.

use std::cell::RefCell;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use crate::controller::{ApplyOutcome, ControllerError};
use crate::simulator::SimulatedController;

use super::harness::{Harness, HarnessOptions};

/// Scenario world shared across BDD steps.
pub struct TestWorld {
    harness: Option<Harness>,
    init_gate: Option<Sender<()>>,
    background: Option<JoinHandle<Result<(), ControllerError>>>,
    pub error: Option<ControllerError>,
    pub outcome: Option<ApplyOutcome>,
}

impl TestWorld {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            harness: None,
            init_gate: None,
            background: None,
            error: None,
            outcome: None,
        }
    }

    /// Starts a controller with `options`.
    pub fn start(&mut self, options: HarnessOptions) {
        self.harness = Some(Harness::start(options));
    }

    /// Starts a controller whose first initialisation blocks until released.
    pub fn start_gated(&mut self) {
        let (release, gate) = mpsc::channel();
        self.init_gate = Some(release);
        self.start(HarnessOptions {
            host: SimulatedController::new().with_init_gate(gate),
            ..HarnessOptions::default()
        });
    }

    /// The running controller.
    #[must_use]
    pub fn harness(&self) -> &Harness {
        self.harness.as_ref().expect("controller should be started")
    }

    /// Records the error of a failed step.
    pub fn record(&mut self, result: Result<(), ControllerError>) {
        if let Err(error) = result {
            self.error = Some(error);
        }
    }

    /// Requests enable from another thread.
    pub fn enable_in_background(&mut self) {
        let handle = self.harness().handle.clone();
        self.background = Some(thread::spawn(move || handle.enable()));
    }

    /// Unblocks a gated initialisation and waits for the background enable.
    pub fn release_initialisation(&mut self) -> Result<(), ControllerError> {
        if let Some(release) = self.init_gate.take() {
            release.send(()).expect("initialisation should be waiting");
        }
        match self.background.take() {
            Some(worker) => worker.join().expect("enable thread should not panic"),
            None => Ok(()),
        }
    }
}

impl Drop for TestWorld {
    fn drop(&mut self) {
        drop(self.init_gate.take());
        if let Some(worker) = self.background.take() {
            drop(worker.join());
        }
        if let Some(harness) = self.harness.as_mut() {
            drop(harness.shutdown());
        }
    }
}

/// Fixture constructor for the BDD world.
#[must_use]
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
