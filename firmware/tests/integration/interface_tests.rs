//! Arbitration tests: the interface, controller, menu and GATT server wired
//! together on the [`Bench`], driven by peer writes, encoder events and
//! hand-fired ticks.

use thermoplate::app::interface::{PlateMode, Priority};
use thermoplate::app::menu::MenuState;
use thermoplate::app::ports::CharacteristicId;
use thermoplate::error::Error;
use thermoplate::events::{HeatRequest, MenuEvent, WirelessRequest};
use thermoplate::heater::HeatingState;

use crate::mock_hw::{Bench, ROOM_C};

const MODE: CharacteristicId = CharacteristicId::MODE;
const CONSTANT: u8 = 0;
const JEDEC: u8 = 1;

fn mode_write(kind: u8) -> WirelessRequest {
    WirelessRequest::new(MODE, &[kind]).unwrap()
}

/// Encoder presses that pick JEDEC from the splash screen.
const PICK_JEDEC: [MenuEvent; 3] = [MenuEvent::Push, MenuEvent::Down, MenuEvent::Push];

// ── Settings ──────────────────────────────────────────────────

#[test]
fn settings_writes_are_stored_and_notified() {
    let bench = Bench::new();
    bench.write(CharacteristicId::CONSTANT_TEMPERATURE, &[0xC8]).unwrap();
    bench.write(CharacteristicId::CONSTANT_DURATION, &[0x2C, 0x01]).unwrap();

    let settings = bench.interface.settings();
    assert_eq!(settings.temperature_c, 200);
    assert_eq!(settings.duration_s, 300);
    assert!(settings.is_complete());
    assert_eq!(
        bench.radio.notified(CharacteristicId::CONSTANT_TEMPERATURE),
        vec![vec![0xC8, 0]]
    );
    assert_eq!(
        bench.radio.notified(CharacteristicId::CONSTANT_DURATION),
        vec![vec![0x2C, 0x01, 0, 0]]
    );
    assert_eq!(bench.interface.owner(), Priority::Idle);
}

#[test]
fn oversized_setting_rejected_without_change() {
    let bench = Bench::new();
    let request = WirelessRequest::new(CharacteristicId::CONSTANT_TEMPERATURE, &[1, 2, 3]).unwrap();
    assert_eq!(
        bench.interface.handle_wireless_request(&request),
        Err(Error::InvalidInputParameter)
    );
    assert_eq!(bench.interface.settings().temperature_c, 0);
    assert!(!bench.interface.settings().is_complete());
}

#[test]
fn unhandled_characteristic_is_unknown_resource() {
    let bench = Bench::new();
    let request = WirelessRequest::new(CharacteristicId::MANUFACTURER_NAME, &[1]).unwrap();
    assert_eq!(
        bench.interface.handle_wireless_request(&request),
        Err(Error::UnknownResource)
    );
}

#[test]
fn reads_report_mode_and_settings() {
    let bench = Bench::new();
    assert_eq!(bench.gatt.handle_read(MODE).unwrap().as_slice(), &[0xFF]);
    assert_eq!(
        bench.gatt.handle_read(CharacteristicId::TEMPERATURE).unwrap().as_slice(),
        &ROOM_C.to_le_bytes()
    );
    bench.write_settings(180, 90);
    assert_eq!(
        bench
            .gatt
            .handle_read(CharacteristicId::CONSTANT_DURATION)
            .unwrap()
            .as_slice(),
        &90u32.to_le_bytes()
    );
}

// ── Wireless constant start ───────────────────────────────────

#[test]
fn constant_start_needs_both_settings() {
    let bench = Bench::new();
    bench.write(CharacteristicId::CONSTANT_TEMPERATURE, &[200]).unwrap();
    bench.radio.clear();

    assert_eq!(
        bench.interface.handle_wireless_request(&mode_write(CONSTANT)),
        Err(Error::InvalidState)
    );
    assert_eq!(bench.interface.owner(), Priority::Idle);
    assert_eq!(bench.controller.state(), HeatingState::Idle);
    // Partial settings are discarded and the peer sees the reset.
    assert!(!bench.interface.settings().is_complete());
    assert_eq!(
        bench.radio.notified(CharacteristicId::CONSTANT_TEMPERATURE),
        vec![vec![0, 0]]
    );
    assert!(bench.radio.notified(MODE).is_empty());
}

#[test]
fn constant_start_with_both_settings_runs() {
    let bench = Bench::new();
    bench.write_settings(200, 60);
    bench.radio.clear();

    bench.write(MODE, &[CONSTANT]).unwrap();

    assert_eq!(bench.interface.owner(), Priority::Wireless);
    assert_eq!(bench.interface.mode(), PlateMode::Constant);
    assert_eq!(bench.controller.state(), HeatingState::Constant);
    assert!(bench.heater.is_on());
    assert_eq!(bench.radio.notified(MODE), vec![vec![0]]);
    assert_eq!(bench.menu.state(), MenuState::Preempted);
}

#[test]
fn wireless_constant_completion_hands_back_and_clears_settings() {
    let bench = Bench::new();
    bench.write_settings(200, 2);
    bench.write(MODE, &[CONSTANT]).unwrap();
    bench.radio.clear();

    bench.ticks(2);

    assert_eq!(bench.controller.state(), HeatingState::Idle);
    assert_eq!(bench.interface.owner(), Priority::Idle);
    assert_eq!(bench.interface.mode(), PlateMode::Idle);
    assert!(!bench.heater.is_on());
    assert_eq!(bench.radio.notified(MODE), vec![vec![0xFF]]);
    assert!(!bench.interface.settings().is_complete());
    assert_eq!(
        bench.radio.notified(CharacteristicId::CONSTANT_DURATION),
        vec![vec![0, 0, 0, 0]]
    );
    assert_eq!(bench.menu.state(), MenuState::HeatingConstant);
}

#[test]
fn zero_duration_releases_ownership() {
    let bench = Bench::new();
    bench.write_settings(200, 0);
    assert_eq!(
        bench.interface.handle_wireless_request(&mode_write(CONSTANT)),
        Err(Error::InvalidInputParameter)
    );
    bench.pump();
    assert_eq!(bench.interface.owner(), Priority::Idle);
    assert_eq!(bench.controller.state(), HeatingState::Idle);
    assert_eq!(bench.menu.state(), MenuState::HeatingConstant);
}

#[test]
fn unknown_mode_byte_rejected() {
    let bench = Bench::new();
    assert_eq!(
        bench.interface.handle_wireless_request(&mode_write(7)),
        Err(Error::InvalidInputParameter)
    );
    assert_eq!(bench.interface.owner(), Priority::Idle);
}

// ── Priorities ────────────────────────────────────────────────

#[test]
fn equal_priority_request_ignored_silently() {
    let bench = Bench::new();
    bench.write(MODE, &[JEDEC]).unwrap();
    assert_eq!(bench.interface.mode(), PlateMode::Jedec);
    bench.radio.clear();
    let switches = bench.heater.switch_count();

    // Settings writes carry wireless priority too: nothing stored, nothing
    // notified.
    bench.write_settings(200, 60);
    assert_eq!(bench.interface.handle_wireless_request(&mode_write(CONSTANT)), Ok(()));

    assert_eq!(bench.interface.mode(), PlateMode::Jedec);
    assert_eq!(bench.controller.state(), HeatingState::MultiStage);
    assert_eq!(bench.heater.switch_count(), switches);
    assert!(!bench.interface.settings().is_complete());
    assert_eq!(bench.interface.settings().temperature_c, 0);
    assert!(bench.radio.all().is_empty());
}

#[test]
fn settings_accepted_again_once_wireless_run_ends() {
    let bench = Bench::new();
    bench.write(MODE, &[JEDEC]).unwrap();
    bench.write(CharacteristicId::CONSTANT_TEMPERATURE, &[90]).unwrap();
    assert_eq!(bench.interface.settings().temperature_c, 0);

    bench.controller.cancel().unwrap();
    bench.tick();
    assert_eq!(bench.interface.owner(), Priority::Idle);

    bench.write(CharacteristicId::CONSTANT_TEMPERATURE, &[90]).unwrap();
    assert_eq!(bench.interface.settings().temperature_c, 90);
}

#[test]
fn menu_request_ignored_while_wireless_owns() {
    let bench = Bench::new();
    bench.write(MODE, &[JEDEC]).unwrap();
    bench.radio.clear();

    assert!(bench.queues.heat_requests.enqueue(HeatRequest::Constant {
        temperature_c: 100,
        duration_s: 10,
    }));
    bench.pump();

    assert_eq!(bench.interface.owner(), Priority::Wireless);
    assert_eq!(bench.controller.state(), HeatingState::MultiStage);
    assert!(bench.radio.all().is_empty());
}

#[test]
fn wireless_preempts_a_menu_run() {
    let bench = Bench::new();
    bench.press(&PICK_JEDEC);
    assert_eq!(bench.menu.state(), MenuState::Wait);
    assert_eq!(bench.interface.owner(), Priority::Menu);
    assert_eq!(bench.controller.state(), HeatingState::MultiStage);

    bench.write_settings(150, 3);
    bench.write(MODE, &[CONSTANT]).unwrap();

    assert_eq!(bench.interface.owner(), Priority::Wireless);
    assert_eq!(bench.controller.state(), HeatingState::Constant);
    assert_eq!(bench.menu.state(), MenuState::Preempted);

    // The displaced menu run's completion must not release the new owner.
    bench.ticks(1);
    assert_eq!(bench.interface.owner(), Priority::Wireless);

    bench.ticks(2);
    assert_eq!(bench.interface.owner(), Priority::Idle);
    assert_eq!(bench.menu.state(), MenuState::HeatingConstant);
}

#[test]
fn menu_run_completion_reports_done() {
    let bench = Bench::new();
    // Splash, constant, temperature 3, time 2 s.
    bench.press(&[
        MenuEvent::Push,
        MenuEvent::Push,
        MenuEvent::Up,
        MenuEvent::Up,
        MenuEvent::Up,
        MenuEvent::Push,
        MenuEvent::Up,
        MenuEvent::Up,
        MenuEvent::Push,
    ]);
    assert_eq!(bench.interface.owner(), Priority::Menu);
    assert_eq!(bench.interface.mode(), PlateMode::Constant);

    bench.ticks(2);
    assert_eq!(bench.interface.owner(), Priority::Idle);
    assert_eq!(bench.menu.state(), MenuState::Done);
    assert_eq!(bench.screen.line(0), "Done");
}

#[test]
fn menu_run_leaves_wireless_settings_alone() {
    let bench = Bench::new();
    bench.write(CharacteristicId::CONSTANT_TEMPERATURE, &[90]).unwrap();
    bench.press(&PICK_JEDEC);
    bench.controller.cancel().unwrap();
    bench.tick();

    assert_eq!(bench.interface.owner(), Priority::Idle);
    assert_eq!(bench.menu.state(), MenuState::Done);
    assert_eq!(bench.interface.settings().temperature_c, 90);
}

// ── Telemetry ─────────────────────────────────────────────────

#[test]
fn temperature_notified_only_when_it_moves() {
    let bench = Bench::new();
    bench.write(MODE, &[JEDEC]).unwrap();
    bench.radio.clear();

    // Telemetry runs ahead of the controller step on each tick, so it
    // reports the reading cached by the previous step.
    bench.tick();
    bench.tick();
    assert_eq!(
        bench.radio.notified(CharacteristicId::TEMPERATURE),
        vec![ROOM_C.to_le_bytes().to_vec()]
    );

    bench.sensor.set(40);
    bench.ticks(2);
    assert_eq!(
        bench.radio.notified(CharacteristicId::TEMPERATURE),
        vec![ROOM_C.to_le_bytes().to_vec(), 40u16.to_le_bytes().to_vec()]
    );
}

#[test]
fn disconnected_peer_does_not_block_arbitration() {
    let bench = Bench::new();
    bench.gatt.set_connected(false);
    bench.write(MODE, &[JEDEC]).unwrap();

    assert_eq!(bench.interface.owner(), Priority::Wireless);
    assert!(bench.radio.all().is_empty());
    assert_eq!(bench.gatt.handle_read(MODE).unwrap().as_slice(), &[JEDEC]);
}
