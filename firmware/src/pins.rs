//! GPIO / peripheral pin assignments for the ThermoPlate main board
//! (ESP32-C3).
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Heater (SSR gate)
// ---------------------------------------------------------------------------

/// Digital output driving the solid-state relay.  HIGH = heater on.
pub const HEATER_TOGGLE_GPIO: i32 = 8;

// ---------------------------------------------------------------------------
// Thermocouple AFE (MAX6675-style, SPI2 half-duplex, read only)
// ---------------------------------------------------------------------------

pub const AFE_SPI_MISO_GPIO: i32 = 7;
pub const AFE_SPI_SCLK_GPIO: i32 = 10;
pub const AFE_SPI_CS_GPIO: i32 = 5;
/// AFE serial clock.
pub const AFE_SPI_CLOCK_HZ: u32 = 500_000;

// ---------------------------------------------------------------------------
// Rotary encoder (KY-040)
// ---------------------------------------------------------------------------

/// Encoder push switch.  Active LOW.
pub const ENCODER_PUSH_GPIO: i32 = 0;
pub const ENCODER_A_GPIO: i32 = 20;
pub const ENCODER_B_GPIO: i32 = 21;

// ---------------------------------------------------------------------------
// 16x2 character LCD (HD44780, 4-bit bus)
// ---------------------------------------------------------------------------

pub const LCD_RS_GPIO: i32 = 1;
pub const LCD_ENABLE_GPIO: i32 = 4;
pub const LCD_D4_GPIO: i32 = 9;
pub const LCD_D5_GPIO: i32 = 6;
pub const LCD_D6_GPIO: i32 = 3;
pub const LCD_D7_GPIO: i32 = 2;
