//! Mock hardware for integration tests.
//!
//! Records every heater switch and radio notification so tests can assert
//! on the full history without touching GPIO, SPI or the BLE stack.  The
//! [`Bench`] wires the real scheduler, timers, controller, interface and
//! menu around these mocks, the same way `main()` does on the target.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thermoplate::adapters::display::{Display, DisplayRenderer, FrameBuffer};
use thermoplate::adapters::gatt::GattServer;
use thermoplate::app::interface::HeatControllerInterface;
use thermoplate::app::menu::Menu;
use thermoplate::app::ports::{CharacteristicId, HeaterSwitch, TemperatureSensor};
use thermoplate::app::{AppQueues, declare_queues};
use thermoplate::config::{HEATER_DUTY, HEATER_TICK, ONESHOT_TIMERS, PlateConfig};
use thermoplate::control::PowerCalculator;
use thermoplate::error::{Error, Result};
use thermoplate::events::MenuEvent;
use thermoplate::heater::HeatController;
use thermoplate::scheduler::Scheduler;
use thermoplate::timer::TimerService;

/// Controller tick used on the bench; short so profiles finish in few ticks.
pub const TICK_MS: u32 = 1_000;

/// Plate temperature reported before a test changes it.
pub const ROOM_C: u16 = 25;

// ── Heater ────────────────────────────────────────────────────

/// Heater output that records every switch.  Clones share the history.
#[derive(Clone, Default)]
pub struct RecordingHeater {
    switches: Arc<Mutex<Vec<bool>>>,
}

#[allow(dead_code)]
impl RecordingHeater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn switches(&self) -> Vec<bool> {
        self.switches.lock().unwrap().clone()
    }

    pub fn switch_count(&self) -> usize {
        self.switches.lock().unwrap().len()
    }

    pub fn is_on(&self) -> bool {
        self.switches.lock().unwrap().last().copied().unwrap_or(false)
    }
}

impl HeaterSwitch for RecordingHeater {
    fn set_on(&mut self, on: bool) -> Result<()> {
        self.switches.lock().unwrap().push(on);
        Ok(())
    }
}

// ── Sensor ────────────────────────────────────────────────────

/// Thermocouple stand-in: returns whatever the test last set, or a bus
/// error while failing.
#[derive(Clone)]
pub struct ScriptedSensor {
    celsius: Arc<AtomicU16>,
    failing: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl ScriptedSensor {
    pub fn new(celsius: u16) -> Self {
        Self {
            celsius: Arc::new(AtomicU16::new(celsius)),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set(&self, celsius: u16) {
        self.celsius.store(celsius, Ordering::SeqCst);
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl TemperatureSensor for ScriptedSensor {
    fn read_celsius(&mut self) -> Result<u16> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::CommunicationError);
        }
        Ok(self.celsius.load(Ordering::SeqCst))
    }
}

// ── Radio ─────────────────────────────────────────────────────

/// Radio sink that records every notification handed to it.
#[derive(Clone, Default)]
pub struct RecordingRadio {
    sent: Arc<Mutex<Vec<(CharacteristicId, Vec<u8>)>>>,
}

#[allow(dead_code)]
impl RecordingRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Closure for [`GattServer::new`].
    pub fn sink(&self) -> impl Fn(CharacteristicId, &[u8]) + Send + Sync + 'static {
        let sent = Arc::clone(&self.sent);
        move |id, bytes| sent.lock().unwrap().push((id, bytes.to_vec()))
    }

    pub fn all(&self) -> Vec<(CharacteristicId, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }

    /// Values notified on `id`, oldest first.
    pub fn notified(&self, id: CharacteristicId) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == id)
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

// ── Timers and a bare controller ──────────────────────────────

/// Timer tables as configured on the target, with a [`TICK_MS`] tick.
/// Not started: tests fire ticks and one-shots by hand.
pub fn bench_timers() -> Arc<TimerService> {
    let config = bench_config();
    Arc::new(TimerService::new(&config.periodic_timers(), &ONESHOT_TIMERS).unwrap())
}

pub fn bench_config() -> PlateConfig {
    PlateConfig {
        controller_tick_ms: TICK_MS,
        ..PlateConfig::default()
    }
}

/// Controller wired to fresh mocks.
#[allow(dead_code)]
pub struct ControllerRig {
    pub timers: Arc<TimerService>,
    pub controller: Arc<HeatController>,
    pub sensor: ScriptedSensor,
    pub heater: RecordingHeater,
}

#[allow(dead_code)]
pub fn controller_rig() -> ControllerRig {
    let timers = bench_timers();
    let sensor = ScriptedSensor::new(ROOM_C);
    let heater = RecordingHeater::new();
    let controller = HeatController::new(
        Arc::clone(&timers),
        HEATER_TICK,
        HEATER_DUTY,
        sensor.clone(),
        heater.clone(),
        PowerCalculator::from_config(&bench_config()),
    );
    controller.init().unwrap();
    ControllerRig {
        timers,
        controller,
        sensor,
        heater,
    }
}

// ── Full bench ────────────────────────────────────────────────

/// Every application component on the host, wired like `main()`.
#[allow(dead_code)]
pub struct Bench {
    pub scheduler: Scheduler,
    pub queues: AppQueues,
    pub timers: Arc<TimerService>,
    pub controller: Arc<HeatController>,
    pub gatt: Arc<GattServer>,
    pub interface: Arc<HeatControllerInterface>,
    pub menu: Arc<Menu>,
    pub sensor: ScriptedSensor,
    pub heater: RecordingHeater,
    pub radio: RecordingRadio,
    pub screen: FrameBuffer,
}

#[allow(dead_code)]
impl Bench {
    /// Bench with a connected peer.
    pub fn new() -> Self {
        let mut scheduler = Scheduler::new();
        let queues = declare_queues(&mut scheduler).unwrap();
        scheduler.init();

        let screen = FrameBuffer::new();
        DisplayRenderer::attach(&queues.display, screen.clone()).unwrap();

        let ControllerRig {
            timers,
            controller,
            sensor,
            heater,
        } = controller_rig();

        let radio = RecordingRadio::new();
        let gatt = Arc::new(GattServer::new(radio.sink()));
        gatt.set_connected(true);

        let interface = HeatControllerInterface::new(
            Arc::clone(&controller),
            gatt.clone(),
            queues.menu.clone(),
            queues.wireless.clone(),
        );
        interface.init(&queues.heat_requests, &timers).unwrap();

        let menu = Menu::new(Display::new(queues.display.clone()), queues.heat_requests.clone());
        menu.attach(&queues.menu).unwrap();

        let bench = Self {
            scheduler,
            queues,
            timers,
            controller,
            gatt,
            interface,
            menu,
            sensor,
            heater,
            radio,
            screen,
        };
        bench.pump();
        bench
    }

    /// Drain the queues until nothing is left to dispatch.
    pub fn pump(&self) {
        while self.scheduler.run_timeout(Duration::from_millis(20)) {}
    }

    /// One controller tick, then dispatch whatever it produced.
    pub fn tick(&self) {
        self.timers.fire_periodic(HEATER_TICK);
        self.pump();
    }

    pub fn ticks(&self, n: usize) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Encoder input, dispatched one event at a time.
    pub fn press(&self, events: &[MenuEvent]) {
        for event in events {
            assert!(self.queues.menu.enqueue(*event));
            self.pump();
        }
    }

    /// A peer write through the GATT server, then dispatch.
    pub fn write(&self, id: CharacteristicId, bytes: &[u8]) -> Result<()> {
        let result = self.gatt.handle_write(id, bytes);
        self.pump();
        result
    }

    /// Both constant-mode settings, as two separate peer writes.
    pub fn write_settings(&self, temperature_c: u16, duration_s: u32) {
        self.write(CharacteristicId::CONSTANT_TEMPERATURE, &temperature_c.to_le_bytes())
            .unwrap();
        self.write(CharacteristicId::CONSTANT_DURATION, &duration_s.to_le_bytes())
            .unwrap();
    }
}
