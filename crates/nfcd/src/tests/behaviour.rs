//! Behavioural tests for the controller lifecycle and routing decisions.

use std::cell::RefCell;
use std::time::Duration;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use nfc_routing::{ExecutionEnvironment, RouteCategory};

use crate::controller::{
    ApplyOutcome, BootContext, ControllerError, ControllerState, Operation,
};
use crate::discovery::{ReaderModeRequest, TechMask};
use crate::hal::HalEvent;
use crate::screen::ScreenState;
use crate::simulator::{HostCall, SimulatedController};

use super::support::{self, HarnessOptions, TestWorld};

type StepResult = Result<(), String>;

const SETTLE: Duration = Duration::from_secs(2);
const TAG_HANDLE: u32 = 7;

#[fixture]
fn world() -> RefCell<TestWorld> {
    support::world()
}

fn unquote(text: &str) -> &str {
    text.trim_matches('"')
}

fn parse_state(text: &str) -> Result<ControllerState, String> {
    [
        ControllerState::Off,
        ControllerState::TurningOn,
        ControllerState::TurningOnForLowPowerExit,
        ControllerState::On,
        ControllerState::TurningOff,
    ]
    .into_iter()
    .find(|state| state.as_str() == text)
    .ok_or_else(|| format!("unknown controller state '{text}'"))
}

fn parse_screen(text: &str) -> Result<ScreenState, String> {
    [
        ScreenState::OffUnlocked,
        ScreenState::OffLocked,
        ScreenState::OnLocked,
        ScreenState::OnUnlocked,
    ]
    .into_iter()
    .find(|screen| screen.as_str() == text)
    .ok_or_else(|| format!("unknown screen state '{text}'"))
}

#[given("a controller that is off")]
fn given_controller_off(world: &RefCell<TestWorld>) {
    world.borrow_mut().start(HarnessOptions::default());
}

#[given("a controller whose initialisation is held")]
fn given_gated_controller(world: &RefCell<TestWorld>) {
    world.borrow_mut().start_gated();
}

#[given("an enabled controller")]
fn given_enabled_controller(world: &RefCell<TestWorld>) -> StepResult {
    let mut world = world.borrow_mut();
    world.start(HarnessOptions::default());
    world
        .harness()
        .handle
        .enable()
        .map_err(|error| format!("enable failed: {error}"))
}

#[given("an enabled controller with a {size} byte routing table")]
fn given_small_table(world: &RefCell<TestWorld>, size: usize) -> StepResult {
    let mut world = world.borrow_mut();
    world.start(HarnessOptions {
        host: SimulatedController::new().with_max_table_size(size),
        ..HarnessOptions::default()
    });
    world
        .harness()
        .handle
        .enable()
        .map_err(|error| format!("enable failed: {error}"))
}

#[when("the controller is enabled")]
fn when_enabled(world: &RefCell<TestWorld>) {
    let mut world = world.borrow_mut();
    let result = world.harness().handle.enable();
    world.record(result);
}

#[when("the controller is disabled")]
fn when_disabled(world: &RefCell<TestWorld>) {
    let mut world = world.borrow_mut();
    let result = world.harness().handle.disable();
    world.record(result);
}

#[when("enabling starts in the background")]
fn when_enable_in_background(world: &RefCell<TestWorld>) {
    world.borrow_mut().enable_in_background();
}

#[when("the controller reports turning on")]
fn when_reports_turning_on(world: &RefCell<TestWorld>) -> StepResult {
    let world = world.borrow();
    let reached = world.harness().wait_until(SETTLE, |harness| {
        harness.handle.state() == ControllerState::TurningOn
    });
    if reached {
        Ok(())
    } else {
        Err(format!("controller stuck in {}", world.harness().handle.state()))
    }
}

#[when("initialisation is released")]
fn when_initialisation_released(world: &RefCell<TestWorld>) {
    let mut world = world.borrow_mut();
    let result = world.release_initialisation();
    world.record(result);
}

#[when("the controller boots")]
fn when_boots(world: &RefCell<TestWorld>) {
    let mut world = world.borrow_mut();
    let result = world.harness().handle.boot(BootContext::default());
    world.record(result);
}

#[when("the controller boots with the radio off")]
fn when_boots_radio_off(world: &RefCell<TestWorld>) {
    let mut world = world.borrow_mut();
    let result = world.harness().handle.boot(BootContext {
        radio_off: true,
        user_restricted: false,
    });
    world.record(result);
}

#[when("routing is applied")]
fn when_routing_applied(world: &RefCell<TestWorld>) -> StepResult {
    let mut world = world.borrow_mut();
    let outcome = world
        .harness()
        .handle
        .apply_routing(false)
        .map_err(|error| format!("apply routing failed: {error}"))?;
    world.outcome = Some(outcome);
    Ok(())
}

#[when("the screen changes to {screen}")]
fn when_screen_changes(world: &RefCell<TestWorld>, screen: String) -> StepResult {
    let state = parse_screen(unquote(&screen))?;
    let world = world.borrow();
    world.harness().screen.set(state);
    world
        .harness()
        .handle
        .on_screen_state_changed(state)
        .map_err(|error| error.to_string())
}

#[when("provisioning starts")]
fn when_provisioning_starts(world: &RefCell<TestWorld>) -> StepResult {
    world
        .borrow()
        .harness()
        .handle
        .set_provisioning_mode(true)
        .map_err(|error| error.to_string())
}

#[when("a tag is discovered")]
fn when_tag_discovered(world: &RefCell<TestWorld>) -> StepResult {
    world
        .borrow()
        .harness()
        .handle
        .event_sink()
        .deliver(HalEvent::TagDiscovered { handle: TAG_HANDLE })
        .map_err(|error| error.to_string())
}

#[when("the tag is lost")]
fn when_tag_lost(world: &RefCell<TestWorld>) -> StepResult {
    world
        .borrow()
        .harness()
        .handle
        .event_sink()
        .deliver(HalEvent::TagLost { handle: TAG_HANDLE })
        .map_err(|error| error.to_string())
}

#[when("an application requests reader mode for NFC-A")]
fn when_reader_mode_requested(world: &RefCell<TestWorld>) -> StepResult {
    let world = world.borrow();
    world
        .harness()
        .handle
        .on_reader_mode_request_changed(Some(ReaderModeRequest::new("wallet", TechMask::A)))
        .map_err(|error| error.to_string())?;
    world.harness().sync();
    Ok(())
}

#[then("the controller is on")]
fn then_controller_on(world: &RefCell<TestWorld>) -> StepResult {
    let state = world.borrow().harness().handle.state();
    if state == ControllerState::On {
        Ok(())
    } else {
        Err(format!("expected on, controller is {state}"))
    }
}

#[then("the controller is off")]
fn then_controller_off(world: &RefCell<TestWorld>) -> StepResult {
    let state = world.borrow().harness().handle.state();
    if state == ControllerState::Off {
        Ok(())
    } else {
        Err(format!("expected off, controller is {state}"))
    }
}

#[then("the controller passed through {sequence}")]
fn then_state_sequence(world: &RefCell<TestWorld>, sequence: String) -> StepResult {
    let expected = unquote(&sequence)
        .split(',')
        .map(parse_state)
        .collect::<Result<Vec<_>, _>>()?;
    let states = world.borrow().harness().reporter.states();
    if states == expected {
        Ok(())
    } else {
        Err(format!("expected {expected:?}, observed {states:?}"))
    }
}

#[then("the hardware was initialised {count} time")]
fn then_initialised_times(world: &RefCell<TestWorld>, count: usize) -> StepResult {
    let calls = world
        .borrow()
        .harness()
        .host
        .count_calls(|call| *call == HostCall::Initialize);
    if calls == count {
        Ok(())
    } else {
        Err(format!("expected {count} initialisations, saw {calls}"))
    }
}

#[then("the hardware was factory reset {count} time")]
fn then_factory_reset_times(world: &RefCell<TestWorld>, count: usize) -> StepResult {
    let calls = world
        .borrow()
        .harness()
        .host
        .count_calls(|call| *call == HostCall::FactoryReset);
    if calls == count {
        Ok(())
    } else {
        Err(format!("expected {count} factory resets, saw {calls}"))
    }
}

#[then("the request is rejected in state {state}")]
fn then_rejected(world: &RefCell<TestWorld>, state: String) -> StepResult {
    let expected = parse_state(unquote(&state))?;
    match world.borrow_mut().error.take() {
        Some(ControllerError::TransitionRejected {
            operation: Operation::Disable,
            state: observed,
        }) if observed == expected => Ok(()),
        other => Err(format!("expected rejection in {expected}, got {other:?}")),
    }
}

#[then("first boot is recorded as complete")]
fn then_first_boot_complete(world: &RefCell<TestWorld>) -> StepResult {
    let stored = world.borrow().harness().stored();
    if !stored.first_boot && stored.payment_default_set {
        Ok(())
    } else {
        Err(format!("first boot not recorded: {stored:?}"))
    }
}

#[then("the firmware was checked")]
fn then_firmware_checked(world: &RefCell<TestWorld>) -> StepResult {
    let checks = world
        .borrow()
        .harness()
        .host
        .count_calls(|call| *call == HostCall::CheckFirmware);
    if checks == 1 {
        Ok(())
    } else {
        Err(format!("expected one firmware check, saw {checks}"))
    }
}

#[then("the stored preference says the controller is off")]
fn then_preference_off(world: &RefCell<TestWorld>) -> StepResult {
    if world.borrow().harness().stored().nfc_on {
        Err("preference still says on".to_owned())
    } else {
        Ok(())
    }
}

#[then("the routing outcome is {outcome}")]
fn then_routing_outcome(world: &RefCell<TestWorld>, outcome: String) -> StepResult {
    let expected = match unquote(&outcome) {
        "unchanged" => ApplyOutcome::Unchanged,
        "reprogrammed" => ApplyOutcome::Reprogrammed,
        "deferred" => ApplyOutcome::Deferred,
        "paused" => ApplyOutcome::Paused,
        "skipped" => ApplyOutcome::Skipped,
        other => return Err(format!("unknown outcome '{other}'")),
    };
    match world.borrow().outcome {
        Some(observed) if observed == expected => Ok(()),
        observed => Err(format!("expected {expected:?}, got {observed:?}")),
    }
}

#[then("discovery polls every technology")]
fn then_polls_everything(world: &RefCell<TestWorld>) -> StepResult {
    let world = world.borrow();
    world.harness().sync();
    let params = world.harness().handle.discovery_parameters();
    if params.tech_mask() == TechMask::DEFAULT {
        Ok(())
    } else {
        Err(format!("unexpected discovery parameters: {params}"))
    }
}

#[then("reader mode is not yet applied")]
fn then_reader_mode_pending(world: &RefCell<TestWorld>) -> StepResult {
    let params = world.borrow().harness().handle.discovery_parameters();
    if params.reader_mode() {
        Err(format!("reader mode applied while a tag is connected: {params}"))
    } else {
        Ok(())
    }
}

#[then("reader mode is applied after the retry")]
fn then_reader_mode_applied(world: &RefCell<TestWorld>) -> StepResult {
    let world = world.borrow();
    let applied = world.harness().wait_until(SETTLE, |harness| {
        harness.handle.discovery_parameters().reader_mode()
    });
    let params = world.harness().handle.discovery_parameters();
    if applied && params.tech_mask() == TechMask::A {
        Ok(())
    } else {
        Err(format!("reader mode not applied: {params}"))
    }
}

#[then("the default route overflows to the host")]
fn then_overflow_to_host(world: &RefCell<TestWorld>) -> StepResult {
    let world = world.borrow();
    let overflow = world.harness().handle.overflow_route();
    let plan = world
        .harness()
        .handle
        .compute_routing_parameters()
        .map_err(|error| error.to_string())?;
    let target = plan.route(RouteCategory::DefaultAid).target();
    if overflow == Some(ExecutionEnvironment::Host) && target == ExecutionEnvironment::Host {
        Ok(())
    } else {
        Err(format!("overflow {overflow:?}, default route {target}"))
    }
}

#[then("the table-full condition was reported once")]
fn then_table_full_once(world: &RefCell<TestWorld>) -> StepResult {
    let count = world.borrow().harness().reporter.table_full_count();
    if count == 1 {
        Ok(())
    } else {
        Err(format!("expected one table-full report, saw {count}"))
    }
}

#[scenario(
    path = "tests/features/controller_lifecycle.feature",
    name = "Enabling twice powers the controller up once"
)]
fn enabling_twice_powers_up_once(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/controller_lifecycle.feature",
    name = "Disabling while turning on is rejected"
)]
fn disabling_while_turning_on_is_rejected(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/controller_lifecycle.feature",
    name = "First boot resets the controller before enabling it"
)]
fn first_boot_resets_controller(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/controller_lifecycle.feature",
    name = "Radio-off boot leaves the controller off"
)]
fn radio_off_boot_stays_off(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/controller_lifecycle.feature",
    name = "Disabling records the user's choice"
)]
fn disabling_records_choice(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/routing_policy.feature",
    name = "An unchanged context does not reprogram discovery"
)]
fn unchanged_context_does_not_reprogram(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/routing_policy.feature",
    name = "Provisioning on a locked screen polls every technology"
)]
fn provisioning_polls_everything(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/routing_policy.feature",
    name = "A connected tag postpones reader mode until it leaves"
)]
fn connected_tag_postpones_reader_mode(world: RefCell<TestWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/routing_policy.feature",
    name = "A full routing table moves the default route to the host"
)]
fn full_table_moves_default_route(world: RefCell<TestWorld>) {
    let _ = world;
}
