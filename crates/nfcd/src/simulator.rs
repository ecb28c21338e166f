//! In-process controller used by the daemon binary and the test suites.
//!
//! [`SimulatedController`] keeps staged and committed routes in memory,
//! serves the committed table in its binary form, and records every call it
//! receives so callers can assert on the programming sequence.

use std::collections::VecDeque;
use std::sync::mpsc::Receiver;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use nfc_routing::{
    EntryType, ExecutionEnvironment, NciVersion, PowerRouteConfig, RouteCategory, RouteRequest,
    RoutingEntry,
};
use tracing::debug;

use crate::discovery::DiscoveryParameters;
use crate::hal::{ClearFlags, DeviceHost};
use crate::screen::ScreenStateMask;

const SIMULATOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::simulator");
const CALL_LOG_CAPACITY: usize = 256;
const DEFAULT_MAX_TABLE_SIZE: usize = 512;
const DEFAULT_POWER_STATE: u8 = 0x3B;
const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(5);

/// A call received by the simulated controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    /// Controller power-up.
    Initialize,
    /// Controller power-down.
    Deinitialize,
    /// Discovery (re)configured.
    EnableDiscovery {
        /// Parameters applied.
        params: DiscoveryParameters,
        /// Whether discovery was already running.
        restart: bool,
    },
    /// Discovery stopped.
    DisableDiscovery,
    /// Route staged.
    SetRoutingEntry(RouteRequest),
    /// Staged routes cleared.
    ClearRoutingEntry(ClearFlags),
    /// Staged routes committed.
    CommitRouting,
    /// Screen state pushed.
    SetScreenState(ScreenStateMask),
    /// Firmware checked.
    CheckFirmware,
    /// Hardware session aborted.
    Abort(String),
    /// Factory reset.
    FactoryReset,
    /// Execution environment selected.
    SelectSecureElement(ExecutionEnvironment),
    /// Execution environment deselected.
    DeselectSecureElement(ExecutionEnvironment),
    /// Remote endpoint dropped.
    DisconnectRemoteEndpoint,
}

#[derive(Debug)]
struct Simulation {
    initialised: bool,
    fail_initialize: bool,
    init_timeout: Duration,
    staged: Vec<RoutingEntry>,
    committed: Vec<RoutingEntry>,
    max_table_size: usize,
    secure_elements: Vec<ExecutionEnvironment>,
    selected: Option<ExecutionEnvironment>,
    discovery: Option<DiscoveryParameters>,
    calls: VecDeque<HostCall>,
}

impl Simulation {
    fn record(&mut self, call: HostCall) {
        if self.calls.len() == CALL_LOG_CAPACITY {
            self.calls.pop_front();
        }
        self.calls.push_back(call);
    }
}

/// In-memory [`DeviceHost`].
#[derive(Debug)]
pub struct SimulatedController {
    simulation: Mutex<Simulation>,
    init_gate: Mutex<Option<Receiver<()>>>,
}

impl Default for SimulatedController {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedController {
    /// Builds a controller with a secure element and a UICC attached.
    #[must_use]
    pub fn new() -> Self {
        Self {
            simulation: Mutex::new(Simulation {
                initialised: false,
                fail_initialize: false,
                init_timeout: DEFAULT_INIT_TIMEOUT,
                staged: Vec::new(),
                committed: Vec::new(),
                max_table_size: DEFAULT_MAX_TABLE_SIZE,
                secure_elements: vec![ExecutionEnvironment::SecureElement, ExecutionEnvironment::Uicc],
                selected: None,
                discovery: None,
                calls: VecDeque::with_capacity(CALL_LOG_CAPACITY),
            }),
            init_gate: Mutex::new(None),
        }
    }

    /// Caps the routing table at `bytes`.
    #[must_use]
    pub fn with_max_table_size(self, bytes: usize) -> Self {
        self.simulation().max_table_size = bytes;
        self
    }

    /// Makes every initialisation attempt fail.
    #[must_use]
    pub fn with_failing_initialize(self) -> Self {
        self.simulation().fail_initialize = true;
        self
    }

    /// Reports `timeout` as the time initialisation may take.
    #[must_use]
    pub fn with_init_timeout(self, timeout: Duration) -> Self {
        self.simulation().init_timeout = timeout;
        self
    }

    /// Blocks the next initialisation until `gate` yields or disconnects.
    #[must_use]
    pub fn with_init_gate(self, gate: Receiver<()>) -> Self {
        *self.init_gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(gate);
        self
    }

    fn simulation(&self) -> MutexGuard<'_, Simulation> {
        self.simulation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Calls received so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<HostCall> {
        self.simulation().calls.iter().cloned().collect()
    }

    /// Number of recorded calls matching `predicate`.
    #[must_use]
    pub fn count_calls(&self, predicate: impl Fn(&HostCall) -> bool) -> usize {
        self.simulation().calls.iter().filter(|call| predicate(call)).count()
    }

    /// Whether the controller is powered up.
    #[must_use]
    pub fn is_initialised(&self) -> bool {
        self.simulation().initialised
    }

    /// Discovery parameters currently running, if any.
    #[must_use]
    pub fn active_discovery(&self) -> Option<DiscoveryParameters> {
        self.simulation().discovery
    }

    /// Entries in the committed table.
    #[must_use]
    pub fn committed_entries(&self) -> Vec<RoutingEntry> {
        self.simulation().committed.clone()
    }

    /// Execution environment currently selected.
    #[must_use]
    pub fn selected_secure_element(&self) -> Option<ExecutionEnvironment> {
        self.simulation().selected
    }
}

impl DeviceHost for SimulatedController {
    fn initialize(&self) -> bool {
        let held = self
            .init_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(gate) = held {
            debug!(target: SIMULATOR_TARGET, "initialisation held at gate");
            if gate.recv().is_err() {
                debug!(target: SIMULATOR_TARGET, "initialisation gate dropped");
            }
        }
        let mut simulation = self.simulation();
        simulation.record(HostCall::Initialize);
        simulation.initialised = !simulation.fail_initialize;
        simulation.initialised
    }

    fn deinitialize(&self) -> bool {
        let mut simulation = self.simulation();
        simulation.record(HostCall::Deinitialize);
        simulation.initialised = false;
        simulation.discovery = None;
        true
    }

    fn enable_discovery(&self, params: &DiscoveryParameters, restart: bool) {
        let mut simulation = self.simulation();
        simulation.record(HostCall::EnableDiscovery {
            params: *params,
            restart,
        });
        simulation.discovery = Some(*params);
    }

    fn disable_discovery(&self) {
        let mut simulation = self.simulation();
        simulation.record(HostCall::DisableDiscovery);
        simulation.discovery = None;
    }

    fn set_routing_entry(
        &self,
        entry_type: EntryType,
        value: u8,
        target: ExecutionEnvironment,
        power_state: u8,
    ) -> bool {
        let request = RouteRequest {
            entry_type,
            value,
            route: PowerRouteConfig::new(target, power_state),
        };
        let mut simulation = self.simulation();
        simulation.record(HostCall::SetRoutingEntry(request));
        simulation.staged.extend(request.entries());
        true
    }

    fn clear_routing_entry(&self, flags: ClearFlags) -> bool {
        let mut simulation = self.simulation();
        simulation.record(HostCall::ClearRoutingEntry(flags));
        simulation
            .staged
            .retain(|entry| !flags.covers(entry.entry_type()));
        true
    }

    fn commit_routing(&self) -> bool {
        let mut simulation = self.simulation();
        simulation.record(HostCall::CommitRouting);
        if !simulation.initialised {
            return false;
        }
        simulation.committed = simulation.staged.clone();
        true
    }

    fn routing_table(&self) -> Vec<u8> {
        nfc_routing::encode(&self.simulation().committed)
    }

    fn max_routing_table_size(&self) -> usize {
        self.simulation().max_table_size
    }

    fn default_route(&self, category: RouteCategory) -> PowerRouteConfig {
        let target = match category {
            RouteCategory::DefaultAid => ExecutionEnvironment::Host,
            RouteCategory::MifareDesfire | RouteCategory::MifareClt | RouteCategory::FelicaClt => {
                ExecutionEnvironment::SecureElement
            }
        };
        PowerRouteConfig::new(target, DEFAULT_POWER_STATE)
    }

    fn set_screen_state(&self, mask: ScreenStateMask) {
        self.simulation().record(HostCall::SetScreenState(mask));
    }

    fn check_firmware(&self) -> bool {
        self.simulation().record(HostCall::CheckFirmware);
        true
    }

    fn abort(&self, reason: &str) {
        let mut simulation = self.simulation();
        simulation.record(HostCall::Abort(reason.to_owned()));
        simulation.initialised = false;
    }

    fn nci_version(&self) -> NciVersion {
        NciVersion::V2
    }

    fn init_timeout(&self) -> Duration {
        self.simulation().init_timeout
    }

    fn factory_reset(&self) {
        let mut simulation = self.simulation();
        simulation.record(HostCall::FactoryReset);
        simulation.staged.clear();
        simulation.committed.clear();
        simulation.selected = None;
    }

    fn secure_elements(&self) -> Vec<ExecutionEnvironment> {
        self.simulation().secure_elements.clone()
    }

    fn select_secure_element(&self, environment: ExecutionEnvironment) -> bool {
        let mut simulation = self.simulation();
        simulation.record(HostCall::SelectSecureElement(environment));
        if !simulation.secure_elements.contains(&environment) {
            return false;
        }
        simulation.selected = Some(environment);
        true
    }

    fn deselect_secure_element(&self, environment: ExecutionEnvironment) -> bool {
        let mut simulation = self.simulation();
        simulation.record(HostCall::DeselectSecureElement(environment));
        if simulation.selected != Some(environment) {
            return false;
        }
        simulation.selected = None;
        true
    }

    fn disconnect_remote_endpoint(&self) {
        self.simulation().record(HostCall::DisconnectRemoteEndpoint);
    }
}
