//! Payload types carried through the scheduler queues.
//!
//! ```text
//! ┌─────────────┐  soft_irq   ┌──────────────┐  enqueue  ┌──────────────┐
//! │ Encoder ISR │────────────▶│ Timer thread │──────────▶│  menu queue  │──▶ Menu
//! └─────────────┘             └──────────────┘           └──────────────┘
//! ┌─────────────┐                                        ┌──────────────┐
//! │    Menu     │───────────────────────────────────────▶│ heat request │──▶ Interface
//! └─────────────┘                                        └──────────────┘
//! ┌─────────────┐                                        ┌──────────────┐
//! │ GATT write  │───────────────────────────────────────▶│   wireless   │──▶ Interface
//! └─────────────┘                                        └──────────────┘
//! ```
//!
//! Display requests live with their renderer in
//! [`crate::adapters::display`].

use crate::app::ports::{CharacteristicId, MAX_WRITE_LEN};
use crate::error::{Error, Result};
use crate::heater::ProfileId;

// ── Menu input ────────────────────────────────────────────────

/// Events understood by the local menu state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MenuEvent {
    /// Encoder turned clockwise.
    Up = 0,
    /// Encoder turned counter-clockwise.
    Down = 1,
    /// Encoder button pressed.
    Push = 2,
    /// Wireless took the controller; stop accepting local input.
    PreemptRequest = 3,
    /// Wireless finished; local input may resume.
    PreemptTake = 4,
    /// The menu's own heating request finished.
    RequestDone = 5,
}

impl MenuEvent {
    /// Encode for transport through a `soft_irq` word.
    pub const fn as_word(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for MenuEvent {
    type Error = Error;

    fn try_from(word: u32) -> Result<Self> {
        match word {
            0 => Ok(Self::Up),
            1 => Ok(Self::Down),
            2 => Ok(Self::Push),
            3 => Ok(Self::PreemptRequest),
            4 => Ok(Self::PreemptTake),
            5 => Ok(Self::RequestDone),
            _ => Err(Error::InvalidInputParameter),
        }
    }
}

// ── Heating requests ──────────────────────────────────────────

/// A complete heating request as produced by the local menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeatRequest {
    /// Hold `temperature_c` for `duration_s` seconds.
    Constant { temperature_c: u16, duration_s: u32 },
    /// Run a built-in multi-stage profile.
    Profile(ProfileId),
}

/// Request type as written to the mode characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HeatRequestKind {
    Constant = 0,
    Jedec = 1,
}

impl TryFrom<u8> for HeatRequestKind {
    type Error = Error;

    fn try_from(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Self::Constant),
            1 => Ok(Self::Jedec),
            _ => Err(Error::InvalidInputParameter),
        }
    }
}

// ── Wireless writes ───────────────────────────────────────────

/// A characteristic write copied off the transport context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WirelessRequest {
    pub characteristic: CharacteristicId,
    pub payload: heapless::Vec<u8, MAX_WRITE_LEN>,
}

impl WirelessRequest {
    /// Copy `bytes`; payloads longer than the scratch buffer are rejected.
    pub fn new(characteristic: CharacteristicId, bytes: &[u8]) -> Result<Self> {
        let payload =
            heapless::Vec::from_slice(bytes).map_err(|()| Error::InvalidInputParameter)?;
        Ok(Self {
            characteristic,
            payload,
        })
    }
}
