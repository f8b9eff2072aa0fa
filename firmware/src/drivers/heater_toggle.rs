//! Heater relay / SSR driver.
//!
//! A dumb two-state actuator on one GPIO.  Duty cycling is done by the
//! heat controller through the duty one-shot timer; this driver only
//! switches the line.

use embedded_hal::digital::OutputPin;
use log::warn;

use crate::app::ports::HeaterSwitch;
use crate::error::{Error, Result};

pub struct HeaterToggle<P> {
    pin: P,
    on: bool,
}

impl<P: OutputPin> HeaterToggle<P> {
    /// Takes the pin and drives it low.
    pub fn new(pin: P) -> Result<Self> {
        let mut toggle = Self { pin, on: true };
        toggle.drive(false)?;
        Ok(toggle)
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    fn drive(&mut self, on: bool) -> Result<()> {
        let result = if on {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        result.map_err(|e| {
            warn!("HeaterToggle: pin write failed ({:?})", e);
            Error::ResourceUnavailable
        })?;
        self.on = on;
        Ok(())
    }
}

impl<P: OutputPin + Send> HeaterSwitch for HeaterToggle<P> {
    fn set_on(&mut self, on: bool) -> Result<()> {
        self.drive(on)
    }
}
