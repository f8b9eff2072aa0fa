//! ThermoPlate Firmware: Main Entry Point
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                    │
//! │  Thermocouple (SPI)  HeaterToggle (GPIO)  Lcd1602 (GPIO)      │
//! │  BleRadio + GattServer                    Encoder ISRs        │
//! │                                                               │
//! │  ──────────────── Port Trait Boundary ───────────────────     │
//! │                                                               │
//! │  HeatController ◀── HeatControllerInterface ◀── Menu          │
//! │                                                               │
//! │  TimerService (timer thread)  ·  Scheduler (this thread)      │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every initialisation failure goes through the fatal handler; after
//! bring-up this thread becomes the scheduler's consumer context.
#![deny(unused_must_use)]

use std::sync::Arc;

use anyhow::Result;
use esp_idf_hal::delay::Ets;
use esp_idf_hal::gpio::{AnyIOPin, AnyOutputPin, Output, PinDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::spi::{SpiConfig, SpiDeviceDriver, SpiDriver, SpiDriverConfig};
use esp_idf_hal::units::Hertz;
use log::info;

use thermoplate::adapters::ble::{self, BleRadio};
use thermoplate::adapters::device_info;
use thermoplate::adapters::display::{Display, DisplayRenderer};
use thermoplate::adapters::gatt::GattServer;
use thermoplate::app::declare_queues;
use thermoplate::app::interface::HeatControllerInterface;
use thermoplate::app::menu::Menu;
use thermoplate::config::{HEATER_DUTY, HEATER_TICK, ONESHOT_TIMERS, PlateConfig};
use thermoplate::control::PowerCalculator;
use thermoplate::drivers::encoder;
use thermoplate::drivers::heater_toggle::HeaterToggle;
use thermoplate::drivers::hw_init;
use thermoplate::drivers::lcd1602::{Lcd1602, LcdPins};
use thermoplate::error::{Error, OrFatal};
use thermoplate::heater::HeatController;
use thermoplate::pins;
use thermoplate::scheduler::Scheduler;
use thermoplate::sensors::Thermocouple;
use thermoplate::timer::TimerService;

type GpioOut = PinDriver<'static, AnyOutputPin, Output>;

/// Claim GPIO `gpio` as a push-pull output.
fn output_pin(gpio: i32) -> thermoplate::error::Result<GpioOut> {
    // SAFETY: each GPIO number in `pins` is claimed exactly once, here.
    let pin = unsafe { AnyOutputPin::new(gpio) };
    PinDriver::output(pin).map_err(|e| {
        log::error!("GPIO{} output init failed: {}", gpio, e);
        Error::ResourceUnavailable
    })
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  ThermoPlate v{}                     ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let config = PlateConfig::default();
    config.validate().or_fatal("configuration");
    let peripherals = Peripherals::take()?;

    // ── 2. Scheduler queues ───────────────────────────────────
    let mut scheduler = Scheduler::new();
    let queues = declare_queues(&mut scheduler).or_fatal("queue declaration");
    scheduler.init();

    // ── 3. Timer service ──────────────────────────────────────
    let timers = Arc::new(
        TimerService::new(&config.periodic_timers(), &ONESHOT_TIMERS).or_fatal("timer tables"),
    );
    timers.start().or_fatal("timer thread");

    // ── 4. Display ────────────────────────────────────────────
    let lcd = Lcd1602::new(
        LcdPins {
            rs: output_pin(pins::LCD_RS_GPIO).or_fatal("LCD RS"),
            enable: output_pin(pins::LCD_ENABLE_GPIO).or_fatal("LCD E"),
            d4: output_pin(pins::LCD_D4_GPIO).or_fatal("LCD D4"),
            d5: output_pin(pins::LCD_D5_GPIO).or_fatal("LCD D5"),
            d6: output_pin(pins::LCD_D6_GPIO).or_fatal("LCD D6"),
            d7: output_pin(pins::LCD_D7_GPIO).or_fatal("LCD D7"),
        },
        Ets,
    )
    .or_fatal("LCD init");
    DisplayRenderer::attach(&queues.display, lcd).or_fatal("display renderer");

    // ── 5. Heat controller ────────────────────────────────────
    // SAFETY: the AFE pins are claimed exactly once, here.
    let (sclk, miso, cs) = unsafe {
        (
            AnyOutputPin::new(pins::AFE_SPI_SCLK_GPIO),
            AnyIOPin::new(pins::AFE_SPI_MISO_GPIO),
            AnyOutputPin::new(pins::AFE_SPI_CS_GPIO),
        )
    };
    let spi = SpiDriver::new_without_sdo(peripherals.spi2, sclk, miso, &SpiDriverConfig::new())?;
    let afe = SpiDeviceDriver::new(
        spi,
        Some(cs),
        &SpiConfig::new()
            .baudrate(Hertz(pins::AFE_SPI_CLOCK_HZ))
            .data_mode(embedded_hal::spi::MODE_0),
    )?;
    let heater = HeaterToggle::new(output_pin(pins::HEATER_TOGGLE_GPIO).or_fatal("heater GPIO"))
        .or_fatal("heater off");

    let controller = HeatController::new(
        Arc::clone(&timers),
        HEATER_TICK,
        HEATER_DUTY,
        Thermocouple::new(afe),
        heater,
        PowerCalculator::from_config(&config),
    );
    controller.init().or_fatal("heat controller init");

    // ── 6. Wireless ───────────────────────────────────────────
    let gatt = Arc::new(GattServer::new(ble::send_notification));
    device_info::register(gatt.as_ref(), &config).or_fatal("device information");

    let interface = HeatControllerInterface::new(
        Arc::clone(&controller),
        gatt.clone(),
        queues.menu.clone(),
        queues.wireless.clone(),
    );
    interface
        .init(&queues.heat_requests, &timers)
        .or_fatal("heat controller interface");

    let mut radio = BleRadio::new(&config.manufacturer_name);
    radio.start(Arc::clone(&gatt)).or_fatal("BLE");

    // ── 7. Local UI ───────────────────────────────────────────
    let menu = Menu::new(Display::new(queues.display.clone()), queues.heat_requests.clone());
    menu.attach(&queues.menu).or_fatal("menu");
    encoder::attach(queues.menu.clone()).or_fatal("encoder sink");
    hw_init::init_encoder_interrupts(Arc::clone(&timers)).or_fatal("encoder interrupts");

    info!("System ready. Entering scheduler loop.");

    // ── 8. Consumer context ───────────────────────────────────
    loop {
        scheduler.run();
    }
}
