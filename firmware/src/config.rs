//! System configuration parameters
//!
//! Tunable parameters for the ThermoPlate controller, plus the
//! compile-time tables declaring every scheduler queue and timer.

use serde::{Deserialize, Serialize};

use crate::adapters::display::DisplayRequest;
use crate::error::{Error, Result};
use crate::events::{HeatRequest, MenuEvent, WirelessRequest};
use crate::scheduler::QueueDescriptor;
use crate::timer::{OneshotTimerDef, OneshotTimerId, PeriodicTimerDef, PeriodicTimerId};

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateConfig {
    // --- Timing ---
    /// Heat controller tick (milliseconds); also the duty-cycle window.
    pub controller_tick_ms: u32,

    // --- Feedback ---
    pub pid_kp: f32,
    pub pid_ki: f32,
    pub pid_kd: f32,
    /// Computed power below this (percent) switches the heater off.
    pub min_power_percent: f32,
    /// Ceiling on computed power (percent).
    pub max_power_percent: f32,

    // --- Device information ---
    pub manufacturer_name: heapless::String<32>,
    pub model_number: heapless::String<32>,
}

impl Default for PlateConfig {
    fn default() -> Self {
        Self {
            controller_tick_ms: 5_000,

            pid_kp: 1.0,
            pid_ki: 0.2,
            pid_kd: 0.0,
            min_power_percent: 5.0,
            max_power_percent: 100.0,

            manufacturer_name: heapless::String::try_from("ThermoPlate").unwrap_or_default(),
            model_number: heapless::String::try_from("ESP32C3Generic").unwrap_or_default(),
        }
    }
}

impl PlateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.controller_tick_ms == 0 {
            return Err(Error::InvalidInputParameter);
        }
        if !(0.0..=100.0).contains(&self.max_power_percent)
            || !(0.0..self.max_power_percent).contains(&self.min_power_percent)
        {
            return Err(Error::InvalidInputParameter);
        }
        Ok(())
    }

    /// Periodic timer table; index order matches the `*_TICK` ids below.
    pub fn periodic_timers(&self) -> [PeriodicTimerDef; 1] {
        [PeriodicTimerDef {
            name: "heater_tick",
            period_ms: self.controller_tick_ms,
        }]
    }
}

// ---------------------------------------------------------------------------
// Timer declarations
// ---------------------------------------------------------------------------

/// Controller step and temperature telemetry.
pub const HEATER_TICK: PeriodicTimerId = PeriodicTimerId(0);
/// Ends the duty-cycle pulse within a tick.
pub const HEATER_DUTY: OneshotTimerId = OneshotTimerId(0);

pub const ONESHOT_TIMERS: [OneshotTimerDef; 1] = [OneshotTimerDef {
    name: "heater_duty",
}];

// ---------------------------------------------------------------------------
// Queue declarations (declaration order is drain order)
// ---------------------------------------------------------------------------

pub const MENU_QUEUE: QueueDescriptor<MenuEvent, 16, 1> = QueueDescriptor::new("menu");
pub const HEAT_REQUEST_QUEUE: QueueDescriptor<HeatRequest, 4, 1> =
    QueueDescriptor::new("heat_request");
pub const WIRELESS_QUEUE: QueueDescriptor<WirelessRequest, 8, 1> =
    QueueDescriptor::new("wireless");
/// Last, so draws queued by earlier subscribers render in the same pass.
pub const DISPLAY_QUEUE: QueueDescriptor<DisplayRequest, 32, 1> =
    QueueDescriptor::new("display");
