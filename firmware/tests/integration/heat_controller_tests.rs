//! Heat controller integration tests against the recording heater and the
//! scripted sensor, with ticks fired by hand.

use std::sync::{Arc, Mutex};

use thermoplate::config::{HEATER_DUTY, HEATER_TICK};
use thermoplate::error::Error;
use thermoplate::heater::{
    HeatOutcome, HeatingProfile, HeatingState, JEDEC_STAGES, ProfileId, TemperatureStage,
};

use crate::mock_hw::{ControllerRig, ROOM_C, TICK_MS, controller_rig};

type Outcomes = Arc<Mutex<Vec<HeatOutcome>>>;

fn recorder() -> (Outcomes, impl FnOnce(HeatOutcome) + Send + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |outcome| sink.lock().unwrap().push(outcome))
}

// ── Stage lookup ──────────────────────────────────────────────

const THREE_STAGES: [TemperatureStage; 3] = [
    TemperatureStage::new(0, 100, 100),
    TemperatureStage::new(100, 140, 250),
    TemperatureStage::new(140, 230, 30),
];

#[test]
fn stage_lookup_follows_elapsed_time() {
    let mut profile = HeatingProfile::new(&THREE_STAGES).unwrap();

    profile.set_elapsed_secs(50);
    assert_eq!(profile.locate_stage(), Some(THREE_STAGES[0]));
    profile.set_elapsed_secs(100);
    assert_eq!(profile.locate_stage(), Some(THREE_STAGES[1]));
    profile.set_elapsed_secs(229);
    assert_eq!(profile.locate_stage(), Some(THREE_STAGES[2]));
    profile.set_elapsed_secs(230);
    assert_eq!(profile.locate_stage(), None);
}

#[test]
fn cursor_never_moves_backwards() {
    let mut profile = HeatingProfile::new(&THREE_STAGES).unwrap();
    profile.set_elapsed_secs(150);
    assert_eq!(profile.locate_stage(), Some(THREE_STAGES[2]));
    assert_eq!(profile.cursor(), 2);

    // Time moved back into an earlier stage: nothing ahead of the cursor
    // matches, so the lookup reports the end.
    profile.set_elapsed_secs(10);
    assert_eq!(profile.locate_stage(), None);
    assert_eq!(profile.cursor(), 2);
}

#[test]
fn malformed_profiles_rejected() {
    let gap = [TemperatureStage::new(0, 10, 50), TemperatureStage::new(20, 30, 60)];
    let late_start = [TemperatureStage::new(5, 10, 50)];
    let empty_window = [TemperatureStage::new(0, 0, 50)];
    let none: [TemperatureStage; 0] = [];
    for stages in [&gap[..], &late_start[..], &empty_window[..], &none[..]] {
        assert_eq!(HeatingProfile::new(stages), Err(Error::InvalidInputParameter));
    }
    assert_eq!(HeatingProfile::constant(200, 0), Err(Error::InvalidInputParameter));
}

// ── Runs to completion ────────────────────────────────────────

#[test]
fn jedec_profile_runs_to_completion_once() {
    let rig = controller_rig();
    let (outcomes, cb) = recorder();
    rig.controller.start_multistage(ProfileId::Jedec, cb).unwrap();
    assert_eq!(rig.controller.state(), HeatingState::MultiStage);

    // The start step covers the first tick; the profile ends at the last
    // stage's upper bound.
    let last = JEDEC_STAGES[JEDEC_STAGES.len() - 1].to_s;
    let steps = (last * 1000 / TICK_MS) as usize;
    for _ in 1..steps {
        rig.timers.fire_periodic(HEATER_TICK);
        assert_eq!(rig.controller.state(), HeatingState::MultiStage);
    }
    rig.timers.fire_periodic(HEATER_TICK);

    assert_eq!(*outcomes.lock().unwrap(), vec![HeatOutcome::Completed]);
    assert_eq!(rig.controller.state(), HeatingState::Idle);
    assert!(!rig.heater.is_on());
    assert_eq!(rig.timers.registered_callbacks(HEATER_TICK), 0);
    assert_eq!(rig.controller.tick(), Err(Error::ExecutionStopped));
    assert_eq!(outcomes.lock().unwrap().len(), 1);
}

#[test]
fn constant_run_tracks_the_plate_reading() {
    let rig = controller_rig();
    rig.controller.start_constant(120, 10, |_| {}).unwrap();
    assert_eq!(rig.controller.get_temperature(), ROOM_C);

    rig.sensor.set(80);
    rig.timers.fire_periodic(HEATER_TICK);
    assert_eq!(rig.controller.get_temperature(), 80);
}

#[test]
fn a_second_start_is_refused_while_running() {
    let rig = controller_rig();
    let (outcomes, cb) = recorder();
    rig.controller.start_constant(120, 10, cb).unwrap();
    assert_eq!(
        rig.controller.start_constant(150, 10, |_| {}),
        Err(Error::InvalidState)
    );
    assert_eq!(rig.controller.state(), HeatingState::Constant);
    assert!(outcomes.lock().unwrap().is_empty());
}

// ── Cancellation ──────────────────────────────────────────────

#[test]
fn cancel_takes_effect_on_the_next_tick() {
    let rig = controller_rig();
    let (outcomes, cb) = recorder();
    rig.controller.start_multistage(ProfileId::Jedec, cb).unwrap();
    rig.timers.fire_periodic(HEATER_TICK);
    let before = rig.heater.switches();
    assert!(rig.heater.is_on());

    rig.controller.cancel().unwrap();
    assert_eq!(rig.controller.state(), HeatingState::Cancelled);
    assert_eq!(rig.heater.switches(), before);
    assert!(outcomes.lock().unwrap().is_empty());

    rig.timers.fire_periodic(HEATER_TICK);
    assert!(!rig.heater.is_on());
    assert_eq!(rig.controller.state(), HeatingState::Idle);
    assert_eq!(rig.timers.registered_callbacks(HEATER_TICK), 0);
    assert_eq!(*outcomes.lock().unwrap(), vec![HeatOutcome::Cancelled]);

    rig.timers.fire_periodic(HEATER_TICK);
    assert_eq!(outcomes.lock().unwrap().len(), 1);
}

#[test]
fn repeated_cancel_completes_once() {
    let rig = controller_rig();
    let (outcomes, cb) = recorder();
    rig.controller.start_constant(200, 60, cb).unwrap();
    rig.controller.cancel().unwrap();
    rig.controller.cancel().unwrap();
    rig.timers.fire_periodic(HEATER_TICK);
    assert_eq!(*outcomes.lock().unwrap(), vec![HeatOutcome::Cancelled]);
}

// ── Duty cycle ────────────────────────────────────────────────

#[test]
fn duty_pulse_ends_inside_the_tick() {
    let rig = controller_rig();
    // 10 degrees short of target: well below full power.
    rig.sensor.set(110);
    rig.controller.start_constant(120, 60, |_| {}).unwrap();
    assert!(rig.heater.is_on());

    let on_ms = rig.timers.pending_delay_ms(HEATER_DUTY).unwrap();
    assert!(on_ms > 0 && on_ms < TICK_MS);
    assert!(rig.timers.fire_oneshot(HEATER_DUTY));
    assert!(!rig.heater.is_on());
}

#[test]
fn full_power_holds_the_heater_for_the_whole_tick() {
    let rig = controller_rig();
    rig.controller.start_constant(250, 60, |_| {}).unwrap();
    assert!(rig.heater.is_on());
    assert_eq!(rig.timers.pending_delay_ms(HEATER_DUTY), None);
}

// ── Sensor failure ────────────────────────────────────────────

#[test]
fn sensor_failure_stalls_the_run() {
    let rig = controller_rig();
    let (outcomes, cb) = recorder();
    rig.controller.start_multistage(ProfileId::Jedec, cb).unwrap();
    assert!(rig.heater.is_on());

    rig.sensor.fail(true);
    rig.timers.fire_periodic(HEATER_TICK);

    assert!(!rig.heater.is_on());
    assert_eq!(rig.controller.state(), HeatingState::MultiStage);
    assert_eq!(rig.timers.registered_callbacks(HEATER_TICK), 0);
    assert!(outcomes.lock().unwrap().is_empty());
    assert_eq!(rig.controller.tick(), Err(Error::CommunicationError));
}

#[test]
fn stalled_run_can_still_be_cancelled() {
    let rig = controller_rig();
    let (outcomes, cb) = recorder();
    rig.controller.start_constant(200, 60, cb).unwrap();
    rig.sensor.fail(true);
    rig.timers.fire_periodic(HEATER_TICK);

    rig.controller.cancel().unwrap();
    assert_eq!(rig.controller.tick(), Err(Error::ExecutionStopped));
    assert_eq!(rig.controller.state(), HeatingState::Idle);
    assert_eq!(*outcomes.lock().unwrap(), vec![HeatOutcome::Cancelled]);
}

#[test]
fn duty_shot_does_not_outlive_a_cancelled_run() {
    let rig = controller_rig();
    rig.sensor.set(110);
    rig.controller.start_constant(120, 60, |_| {}).unwrap();
    assert!(rig.timers.pending_delay_ms(HEATER_DUTY).is_some());

    rig.controller.cancel().unwrap();
    rig.sensor.set(ROOM_C);
    rig.controller.start_constant(250, 60, |_| {}).unwrap();

    // Full power: the new run holds the heater for the whole tick.
    assert_eq!(rig.timers.pending_delay_ms(HEATER_DUTY), None);
    assert!(!rig.timers.fire_oneshot(HEATER_DUTY));
    assert!(rig.heater.is_on());
}

#[test]
fn duty_shot_dropped_when_the_profile_completes() {
    let rig = controller_rig();
    rig.sensor.set(110);
    rig.controller.start_constant(120, 2, |_| {}).unwrap();
    rig.timers.fire_periodic(HEATER_TICK);
    assert!(rig.timers.pending_delay_ms(HEATER_DUTY).is_some());

    rig.timers.fire_periodic(HEATER_TICK);
    assert_eq!(rig.controller.state(), HeatingState::Idle);
    assert_eq!(rig.timers.pending_delay_ms(HEATER_DUTY), None);
    assert!(!rig.heater.is_on());
}

// ── Chained starts ────────────────────────────────────────────

type Chained = Arc<Mutex<Option<Result<(), Error>>>>;

/// Completion callback that immediately starts another constant run.
fn chain_start(rig: &ControllerRig) -> (Chained, impl FnOnce(HeatOutcome) + Send + 'static) {
    let result: Chained = Arc::default();
    let (slot, ctrl) = (Arc::clone(&result), Arc::clone(&rig.controller));
    (result, move |_| {
        *slot.lock().unwrap() = Some(ctrl.start_constant(150, 60, |_| {}));
    })
}

#[test]
fn start_from_a_cancel_completion_finds_a_free_tick_slot() {
    let rig = controller_rig();
    // Another subscriber keeps the first slot, as telemetry does.
    rig.timers.register_periodic_callback(HEATER_TICK, |_| {}).unwrap();
    let (chained, cb) = chain_start(&rig);
    rig.controller.start_constant(120, 60, cb).unwrap();

    rig.controller.cancel().unwrap();
    rig.timers.fire_periodic(HEATER_TICK);

    assert_eq!(*chained.lock().unwrap(), Some(Ok(())));
    assert_eq!(rig.controller.state(), HeatingState::Constant);
    assert_eq!(rig.timers.registered_callbacks(HEATER_TICK), 2);

    // The chained run keeps ticking on its own registration.
    rig.timers.fire_periodic(HEATER_TICK);
    assert_eq!(rig.controller.state(), HeatingState::Constant);
    assert_eq!(rig.timers.registered_callbacks(HEATER_TICK), 2);
}

#[test]
fn start_from_a_finished_run_finds_a_free_tick_slot() {
    let rig = controller_rig();
    rig.timers.register_periodic_callback(HEATER_TICK, |_| {}).unwrap();
    let (chained, cb) = chain_start(&rig);
    rig.controller.start_constant(120, 1, cb).unwrap();

    rig.timers.fire_periodic(HEATER_TICK);

    assert_eq!(*chained.lock().unwrap(), Some(Ok(())));
    assert_eq!(rig.controller.state(), HeatingState::Constant);
    assert_eq!(rig.timers.registered_callbacks(HEATER_TICK), 2);
}
