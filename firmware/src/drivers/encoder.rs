//! Rotary encoder with push button.
//!
//! ## Hardware
//!
//! Two quadrature lines (A, B) and an active-low push switch, all with
//! pull-ups and interrupts on both edges.  The edge ISR samples both line
//! levels and feeds them to a table-driven decoder; a completed detent is
//! handed to the timer context through `soft_irq_from_isr`, which then
//! posts a [`MenuEvent`] on the menu queue.
//!
//! ## Decoding
//!
//! | Sequence (A, B levels)        | Event  |
//! |-------------------------------|--------|
//! | 11 → 01 → 00 → 10 → 11 (A leads) | `Up`   |
//! | 11 → 10 → 00 → 01 → 11 (B leads) | `Down` |
//!
//! Bounces inside a detent walk back and forth between neighbouring
//! states and never emit.

use core::cell::Cell;
use std::sync::OnceLock;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{debug, warn};

use crate::error::{Error, Result};
use crate::events::MenuEvent;
use crate::scheduler::QueueHandle;
use crate::timer::TimerService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    Rest,
    UpBegin,
    UpNext,
    UpFinal,
    DownBegin,
    DownNext,
    DownFinal,
}

use DecoderState::{DownBegin, DownFinal, DownNext, Rest, UpBegin, UpFinal, UpNext};

/// Next state per current state, indexed by `(b << 1) | a`.
const TRANSITIONS: [[DecoderState; 4]; 7] = [
    /* Rest      */ [Rest, DownBegin, UpBegin, Rest],
    /* UpBegin   */ [UpNext, Rest, UpBegin, Rest],
    /* UpNext    */ [UpNext, UpFinal, UpBegin, Rest],
    /* UpFinal   */ [UpNext, UpFinal, Rest, Rest],
    /* DownBegin */ [DownNext, DownBegin, Rest, Rest],
    /* DownNext  */ [DownNext, DownBegin, DownFinal, Rest],
    /* DownFinal */ [DownNext, Rest, DownFinal, Rest],
];

const BOTH_HIGH: usize = 0b11;

/// Seven-state quadrature decoder.
#[derive(Debug, Clone, Copy)]
pub struct QuadratureDecoder {
    state: DecoderState,
}

impl Default for QuadratureDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl QuadratureDecoder {
    pub const fn new() -> Self {
        Self { state: Rest }
    }

    /// Feed the current line levels; returns a detent when one completes.
    pub fn process(&mut self, a: bool, b: bool) -> Option<MenuEvent> {
        let lines = (usize::from(b) << 1) | usize::from(a);
        let previous = self.state;
        self.state = TRANSITIONS[previous as usize][lines];
        match (previous, lines) {
            (UpFinal, BOTH_HIGH) => Some(MenuEvent::Up),
            (DownFinal, BOTH_HIGH) => Some(MenuEvent::Down),
            _ => None,
        }
    }
}

// ── ISR glue ──────────────────────────────────────────────────

static DECODER: Mutex<CriticalSectionRawMutex, Cell<QuadratureDecoder>> =
    Mutex::new(Cell::new(QuadratureDecoder::new()));

static MENU_SINK: OnceLock<QueueHandle<MenuEvent>> = OnceLock::new();

/// Route decoded events to `menu`.  Once per boot.
pub fn attach(menu: QueueHandle<MenuEvent>) -> Result<()> {
    MENU_SINK.set(menu).map_err(|_| Error::InvalidState)
}

/// A/B edge interrupt handler.  Interrupt-safe.
pub fn on_quadrature_edge(timers: &TimerService, a: bool, b: bool) {
    let detent = DECODER.lock(|cell| {
        let mut decoder = cell.get();
        let detent = decoder.process(a, b);
        cell.set(decoder);
        detent
    });
    if let Some(event) = detent {
        // A full deferral ring drops the detent; nothing can be logged here.
        let _ = timers.soft_irq_from_isr(forward_menu_event, 0, event.as_word());
    }
}

/// Push-button interrupt handler (falling edge).  Interrupt-safe.
pub fn on_push_edge(timers: &TimerService) {
    let _ = timers.soft_irq_from_isr(forward_menu_event, 0, MenuEvent::Push.as_word());
}

/// Soft-IRQ routine: runs on the timer context.
fn forward_menu_event(_arg: usize, word: u32) {
    let event = match MenuEvent::try_from(word) {
        Ok(event) => event,
        Err(_) => {
            warn!("Encoder: bad event word {}", word);
            return;
        }
    };
    let Some(queue) = MENU_SINK.get() else {
        debug!("Encoder: {:?} before attach, dropped", event);
        return;
    };
    if !queue.enqueue(event) {
        warn!("Encoder: menu queue full, {:?} dropped", event);
    }
}
