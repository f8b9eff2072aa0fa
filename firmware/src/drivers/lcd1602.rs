//! HD44780 16×2 character LCD in 4-bit mode (R/W tied low).
//!
//! Six GPIO outputs: RS, E and D4..D7.  Every byte goes out as two
//! nibbles, high nibble first, latched on the falling edge of E.  The four
//! custom glyphs are loaded into CGRAM slots 0..3 at init so that
//! [`Symbol`] discriminants double as character codes.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::{debug, warn};

use crate::adapters::display::check_bounds;
use crate::app::ports::{DisplayPort, Symbol};
use crate::error::{Error, Result};

// ── Commands ──────────────────────────────────────────────────

const CLEAR_DISPLAY: u8 = 0x01;
const DISPLAY_CONTROL: u8 = 0x08;
const FUNCTION_SET: u8 = 0x20;
const SET_CGRAM_ADDR: u8 = 0x40;
const SET_DDRAM_ADDR: u8 = 0x80;

const DISPLAY_ON: u8 = 0x04;
const TWO_LINES: u8 = 0x08;

/// DDRAM address of the first cell of line 1.
const LINE_1_OFFSET: u8 = 0x40;

/// (symbol, 5×8 bitmap) pairs loaded at init.
pub const GLYPHS: [(Symbol, [u8; 8]); 4] = [
    (
        Symbol::Heart,
        [0b00000, 0b01010, 0b11111, 0b11111, 0b01110, 0b00100, 0b00000, 0b00000],
    ),
    (
        Symbol::PlateProgram,
        [0b00000, 0b01110, 0b01010, 0b01110, 0b01000, 0b01000, 0b00000, 0b11111],
    ),
    (
        Symbol::ArrowUp,
        [0b00000, 0b00100, 0b01110, 0b11111, 0b00100, 0b00100, 0b00100, 0b00000],
    ),
    (
        Symbol::ArrowDown,
        [0b00000, 0b00100, 0b00100, 0b00100, 0b11111, 0b01110, 0b00100, 0b00000],
    ),
];

pub struct LcdPins<P> {
    pub rs: P,
    pub enable: P,
    pub d4: P,
    pub d5: P,
    pub d6: P,
    pub d7: P,
}

pub struct Lcd1602<P, D> {
    pins: LcdPins<P>,
    delay: D,
}

impl<P: OutputPin, D: DelayNs> Lcd1602<P, D> {
    /// Run the 4-bit init sequence, load the glyphs and hide the cursor.
    pub fn new(pins: LcdPins<P>, delay: D) -> Result<Self> {
        let mut lcd = Self { pins, delay };
        lcd.delay.delay_ms(50);
        // Three 8-bit function sets, then switch to 4-bit.
        for wait_ms in [5, 1, 1] {
            lcd.write_nibble(false, 0x3)?;
            lcd.delay.delay_ms(wait_ms);
        }
        lcd.write_nibble(false, 0x2)?;
        lcd.delay.delay_ms(1);

        lcd.command(FUNCTION_SET | TWO_LINES)?;
        lcd.command(DISPLAY_CONTROL | DISPLAY_ON)?;
        lcd.command(CLEAR_DISPLAY)?;
        lcd.delay.delay_ms(3);

        for (symbol, bitmap) in &GLYPHS {
            lcd.create_char(*symbol as u8, bitmap)?;
        }
        debug!("Lcd1602: initialised");
        Ok(lcd)
    }

    /// Load a 5×8 bitmap into CGRAM slot `location` (0..8).
    pub fn create_char(&mut self, location: u8, bitmap: &[u8; 8]) -> Result<()> {
        if location > 7 {
            return Err(Error::InvalidInputParameter);
        }
        self.command(SET_CGRAM_ADDR | (location << 3))?;
        for row in bitmap {
            self.data(*row)?;
        }
        Ok(())
    }

    pub fn set_cursor(&mut self, line: u8, column: u8) -> Result<()> {
        let base = if line == 0 { 0 } else { LINE_1_OFFSET };
        self.command(SET_DDRAM_ADDR | base | (column & 0x0F))
    }

    fn command(&mut self, byte: u8) -> Result<()> {
        self.write_byte(false, byte)
    }

    fn data(&mut self, byte: u8) -> Result<()> {
        self.write_byte(true, byte)
    }

    fn write_byte(&mut self, rs: bool, byte: u8) -> Result<()> {
        self.write_nibble(rs, byte >> 4)?;
        self.write_nibble(rs, byte & 0x0F)
    }

    fn write_nibble(&mut self, rs: bool, nibble: u8) -> Result<()> {
        let LcdPins {
            rs: rs_pin,
            enable,
            d4,
            d5,
            d6,
            d7,
        } = &mut self.pins;
        set(rs_pin, rs)?;
        set(d4, nibble & 0x1 != 0)?;
        set(d5, nibble & 0x2 != 0)?;
        set(d6, nibble & 0x4 != 0)?;
        set(d7, nibble & 0x8 != 0)?;
        set(enable, true)?;
        self.delay.delay_us(20);
        set(enable, false)?;
        self.delay.delay_us(60);
        Ok(())
    }
}

fn set<P: OutputPin>(pin: &mut P, high: bool) -> Result<()> {
    let result = if high { pin.set_high() } else { pin.set_low() };
    result.map_err(|e| {
        warn!("Lcd1602: pin write failed ({:?})", e);
        Error::ResourceUnavailable
    })
}

impl<P: OutputPin + Send, D: DelayNs + Send> DisplayPort for Lcd1602<P, D> {
    fn clear(&mut self) -> Result<()> {
        self.command(CLEAR_DISPLAY)?;
        self.delay.delay_ms(10);
        Ok(())
    }

    fn write_text(&mut self, line: u8, column: u8, text: &str) -> Result<()> {
        check_bounds(line, column, text.len())?;
        self.set_cursor(line, column)?;
        for byte in text.bytes() {
            self.data(byte)?;
        }
        Ok(())
    }

    fn write_symbol(&mut self, line: u8, column: u8, symbol: Symbol) -> Result<()> {
        check_bounds(line, column, 1)?;
        self.set_cursor(line, column)?;
        self.data(symbol as u8)
    }
}
