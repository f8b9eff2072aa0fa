//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ HeatController / Interface / Menu (domain)
//! ```
//!
//! Driven adapters (thermocouple, heater relay, GATT server, LCD) implement
//! these traits, so the domain never touches hardware directly and every
//! path can be exercised on the host against mocks.

use std::sync::Arc;

use crate::error::Result;

// ───────────────────────────────────────────────────────────────
// Sensor port (hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Synchronous temperature read.
pub trait TemperatureSensor: Send {
    /// Whole degrees Celsius.  `CommunicationError` when the bus transfer
    /// fails, `ConversionError` when the frame is flagged invalid.
    fn read_celsius(&mut self) -> Result<u16>;
}

// ───────────────────────────────────────────────────────────────
// Actuator port (domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Binary heater output.
pub trait HeaterSwitch: Send {
    fn set_on(&mut self, on: bool) -> Result<()>;
}

// ───────────────────────────────────────────────────────────────
// Wireless transport port
// ───────────────────────────────────────────────────────────────

/// Largest characteristic write accepted (scratch buffer size).
pub const MAX_WRITE_LEN: usize = 16;
/// Largest characteristic value returned by a read.
pub const MAX_READ_LEN: usize = 32;

/// 16-bit characteristic identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CharacteristicId(pub u16);

impl CharacteristicId {
    pub const MANUFACTURER_NAME: Self = Self(0x2A29);
    pub const MODEL_NUMBER: Self = Self(0x2A24);
    pub const TEMPERATURE: Self = Self(0x2A6E);
    pub const MODE: Self = Self(0x2A26);
    pub const CONSTANT_TEMPERATURE: Self = Self(0x2A27);
    pub const CONSTANT_DURATION: Self = Self(0x2A28);
}

/// Characteristic value as produced by a read observer.
pub type ReadValue = heapless::Vec<u8, MAX_READ_LEN>;

/// Answers reads for the characteristics in its filter.
pub type ReadObserver = Arc<dyn Fn(CharacteristicId) -> ReadValue + Send + Sync>;
/// Receives writes for the characteristics in its filter.  The payload is
/// a copy in the transport's scratch buffer.
pub type WriteObserver = Arc<dyn Fn(CharacteristicId, &[u8]) + Send + Sync>;

/// Characteristic plumbing of the wireless link.
pub trait WirelessTransport: Send + Sync {
    fn add_read_observer(&self, filter: &[CharacteristicId], observer: ReadObserver) -> Result<()>;

    fn add_write_observer(&self, filter: &[CharacteristicId], observer: WriteObserver)
    -> Result<()>;

    /// Push the current value of `id` to a connected peer.
    fn notify(&self, id: CharacteristicId) -> Result<()>;
}

// ───────────────────────────────────────────────────────────────
// Display port (domain → character LCD)
// ───────────────────────────────────────────────────────────────

/// Custom glyphs loaded into the LCD's CGRAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Symbol {
    Heart = 0,
    PlateProgram = 1,
    ArrowUp = 2,
    ArrowDown = 3,
}

/// Low-level character display.
pub trait DisplayPort: Send {
    fn clear(&mut self) -> Result<()>;
    fn write_text(&mut self, line: u8, column: u8, text: &str) -> Result<()>;
    fn write_symbol(&mut self, line: u8, column: u8, symbol: Symbol) -> Result<()>;
}
