//! Character display plumbing.
//!
//! ```text
//!   Menu ──▶ Display::print() ──▶ display queue ──▶ DisplayRenderer ──▶ DisplayPort
//! ```
//!
//! Producers format text into fixed-size [`DisplayRequest`]s and queue
//! them; the renderer drains the queue on the scheduler context and drives
//! the LCD (or the in-memory [`FrameBuffer`] on the host).

use core::fmt::{self, Write as _};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::warn;

use crate::app::ports::{DisplayPort, Symbol};
use crate::error::{Error, Result};
use crate::scheduler::{QueueHandle, SubscriptionHandle};

pub const LCD_COLUMNS: usize = 16;
pub const LCD_LINES: usize = 2;

pub type LineText = heapless::String<LCD_COLUMNS>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayRequest {
    Clear,
    Text { line: u8, column: u8, text: LineText },
    Symbol { line: u8, column: u8, symbol: Symbol },
}

/// Producer side of the display queue.
#[derive(Clone)]
pub struct Display {
    queue: QueueHandle<DisplayRequest>,
}

impl Display {
    pub fn new(queue: QueueHandle<DisplayRequest>) -> Self {
        Self { queue }
    }

    pub fn clear(&self) -> Result<()> {
        self.send(DisplayRequest::Clear)
    }

    /// Queue formatted text.  `ResourceUnavailable` when it does not fit a
    /// line.
    pub fn print(&self, line: u8, column: u8, args: fmt::Arguments<'_>) -> Result<()> {
        let mut text = LineText::new();
        text.write_fmt(args).map_err(|_| Error::ResourceUnavailable)?;
        self.send(DisplayRequest::Text { line, column, text })
    }

    pub fn symbol(&self, line: u8, column: u8, symbol: Symbol) -> Result<()> {
        self.send(DisplayRequest::Symbol {
            line,
            column,
            symbol,
        })
    }

    fn send(&self, request: DisplayRequest) -> Result<()> {
        if self.queue.enqueue(request) {
            Ok(())
        } else {
            Err(Error::CollectionFull)
        }
    }
}

/// Consumer side: applies queued requests to a [`DisplayPort`].
pub struct DisplayRenderer;

impl DisplayRenderer {
    pub fn attach(
        queue: &QueueHandle<DisplayRequest>,
        port: impl DisplayPort + 'static,
    ) -> Result<SubscriptionHandle> {
        let port = Mutex::new(port);
        queue
            .subscribe(move |request| {
                let mut port = port.lock().unwrap_or_else(PoisonError::into_inner);
                if let Err(e) = render(&mut *port, request) {
                    warn!("Display: {:?} failed: {}", request, e);
                }
            })
            .ok_or(Error::CollectionFull)
    }
}

pub fn render(port: &mut dyn DisplayPort, request: &DisplayRequest) -> Result<()> {
    match request {
        DisplayRequest::Clear => port.clear(),
        DisplayRequest::Text { line, column, text } => port.write_text(*line, *column, text),
        DisplayRequest::Symbol {
            line,
            column,
            symbol,
        } => port.write_symbol(*line, *column, *symbol),
    }
}

/// Check that `width` cells starting at (`line`, `column`) are on screen.
pub fn check_bounds(line: u8, column: u8, width: usize) -> Result<()> {
    if usize::from(line) >= LCD_LINES {
        return Err(Error::InvalidInputParameter);
    }
    if usize::from(column) + width > LCD_COLUMNS {
        return Err(Error::ResourceUnavailable);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// In-memory display
// ───────────────────────────────────────────────────────────────

/// Glyph shown for custom symbols in [`FrameBuffer::line`].
pub const SYMBOL_PLACEHOLDER: char = '#';

/// Shared 16×2 character grid.  Clones view the same cells.
#[derive(Clone)]
pub struct FrameBuffer {
    cells: Arc<Mutex<[[char; LCD_COLUMNS]; LCD_LINES]>>,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            cells: Arc::new(Mutex::new([[' '; LCD_COLUMNS]; LCD_LINES])),
        }
    }

    /// Contents of `line`, trailing blanks trimmed.
    pub fn line(&self, line: usize) -> String {
        let cells = self.cells();
        cells
            .get(line)
            .map(|row| row.iter().collect::<String>().trim_end().to_owned())
            .unwrap_or_default()
    }

    fn blank(&self) {
        *self.cells() = [[' '; LCD_COLUMNS]; LCD_LINES];
    }

    fn cells(&self) -> MutexGuard<'_, [[char; LCD_COLUMNS]; LCD_LINES]> {
        self.cells.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DisplayPort for FrameBuffer {
    fn clear(&mut self) -> Result<()> {
        self.blank();
        Ok(())
    }

    fn write_text(&mut self, line: u8, column: u8, text: &str) -> Result<()> {
        check_bounds(line, column, text.chars().count())?;
        let mut cells = self.cells();
        let row = &mut cells[usize::from(line)];
        for (cell, c) in row[usize::from(column)..].iter_mut().zip(text.chars()) {
            *cell = c;
        }
        Ok(())
    }

    fn write_symbol(&mut self, line: u8, column: u8, _symbol: Symbol) -> Result<()> {
        check_bounds(line, column, 1)?;
        self.cells()[usize::from(line)][usize::from(column)] = SYMBOL_PLACEHOLDER;
        Ok(())
    }
}
