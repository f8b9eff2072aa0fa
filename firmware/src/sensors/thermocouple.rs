//! K-type thermocouple front end (MAX6675-style, read-only SPI).
//!
//! ## Frame
//!
//! | Bits  | Meaning                                  |
//! |-------|------------------------------------------|
//! | 15    | dummy sign bit, always 0                 |
//! | 14..3 | temperature, 0.25 °C per LSB             |
//! | 2     | thermocouple input open                  |
//! | 1..0  | device id / state                        |
//!
//! Sent big-endian, two bytes per conversion.

use embedded_hal::spi::{Error as _, SpiDevice};
use log::warn;

use crate::app::ports::TemperatureSensor;
use crate::error::{Error, Result};

const TEMPERATURE_MASK: u16 = 0x7FF8;
const OPEN_INPUT_BIT: u16 = 0x0004;

/// Decode one conversion frame to whole degrees Celsius.
pub fn frame_to_celsius(frame: [u8; 2]) -> Result<u16> {
    let raw = u16::from_be_bytes(frame);
    if raw & OPEN_INPUT_BIT != 0 {
        return Err(Error::ConversionError);
    }
    Ok(((raw & TEMPERATURE_MASK) >> 3) / 4)
}

pub struct Thermocouple<SPI> {
    spi: SPI,
}

impl<SPI: SpiDevice> Thermocouple<SPI> {
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    pub fn read_frame(&mut self) -> Result<[u8; 2]> {
        let mut frame = [0u8; 2];
        self.spi.read(&mut frame).map_err(|e| {
            warn!("Thermocouple: SPI read failed ({:?})", e.kind());
            Error::CommunicationError
        })?;
        Ok(frame)
    }

    pub fn release(self) -> SPI {
        self.spi
    }
}

impl<SPI: SpiDevice + Send> TemperatureSensor for Thermocouple<SPI> {
    fn read_celsius(&mut self) -> Result<u16> {
        frame_to_celsius(self.read_frame()?)
    }
}
