//! Local UI: the encoder-driven menu state machine.
//!
//! Same table-driven pattern as a classic embedded FSM: one descriptor per
//! state holding a plain `fn` event handler and a `fn` drawing routine.
//! The engine feeds every [`MenuEvent`] to the current state's handler,
//! switches state if it returns `Some(next)`, then redraws the (possibly
//! new) current state.
//!
//! ```text
//!  INIT ──[push]──▶ CONSTANT ◀──[up]── JEDEC
//!   ▲                  │  ──[down]──▶    │
//!   │               [push]             [push] / Profile(Jedec)
//!   │                  ▼                 │
//!   │            TEMPERATURE SET         │
//!   │                  │ [push]          │
//!   │                  ▼                 │
//!   │               TIME SET ──[push]────┤ / Constant{t, d}
//!   │                                    ▼
//!  DONE ◀──────[request done]────────── WAIT
//!
//!  Any input state ──[preempt request]──▶ PREEMPTED ──[preempt take]──▶ CONSTANT
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};

use crate::adapters::display::Display;
use crate::error::{Error, Result};
use crate::events::{HeatRequest, MenuEvent};
use crate::heater::ProfileId;
use crate::scheduler::{QueueHandle, SubscriptionHandle};

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MenuState {
    Init = 0,
    Preempted = 1,
    HeatingConstant = 2,
    TemperatureSet = 3,
    TimeSet = 4,
    Jedec = 5,
    Wait = 6,
    Done = 7,
}

impl MenuState {
    pub const COUNT: usize = 8;

    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Init,
            1 => Self::Preempted,
            2 => Self::HeatingConstant,
            3 => Self::TemperatureSet,
            4 => Self::TimeSet,
            5 => Self::Jedec,
            6 => Self::Wait,
            7 => Self::Done,
            _ => {
                debug_assert!(false, "invalid menu state index: {idx}");
                Self::Init
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Context and descriptors
// ---------------------------------------------------------------------------

/// Everything a handler may touch: the display, the heat-request queue and
/// the constant-mode values being edited.
pub struct MenuContext {
    display: Display,
    requests: QueueHandle<HeatRequest>,
    pub temperature_c: u16,
    pub duration_s: u32,
}

impl MenuContext {
    pub fn new(display: Display, requests: QueueHandle<HeatRequest>) -> Self {
        Self {
            display,
            requests,
            temperature_c: 0,
            duration_s: 0,
        }
    }

    fn send(&self, request: HeatRequest) -> bool {
        let sent = self.requests.enqueue(request);
        if !sent {
            warn!("Menu: heat request queue full, {:?} dropped", request);
        }
        sent
    }
}

/// Returns `Some(next)` to change state, `None` to stay.
pub type MenuEventFn = fn(&mut MenuContext, MenuEvent) -> Option<MenuState>;
pub type MenuDrawFn = fn(&MenuContext) -> Result<()>;

pub struct MenuStateDescriptor {
    pub id: MenuState,
    pub name: &'static str,
    pub on_event: MenuEventFn,
    pub draw: MenuDrawFn,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct MenuFsm {
    table: [MenuStateDescriptor; MenuState::COUNT],
    current: usize,
}

impl MenuFsm {
    pub fn new(table: [MenuStateDescriptor; MenuState::COUNT], initial: MenuState) -> Self {
        Self {
            table,
            current: initial as usize,
        }
    }

    /// Draw the initial state.
    pub fn start(&self, ctx: &MenuContext) {
        info!("Menu: starting in {}", self.table[self.current].name);
        self.draw(ctx);
    }

    pub fn handle(&mut self, ctx: &mut MenuContext, event: MenuEvent) {
        if let Some(next) = (self.table[self.current].on_event)(ctx, event) {
            let next_idx = next as usize;
            if next_idx != self.current {
                info!(
                    "Menu: {} -> {} on {:?}",
                    self.table[self.current].name, self.table[next_idx].name, event
                );
            }
            self.current = next_idx;
        }
        self.draw(ctx);
    }

    pub fn current_state(&self) -> MenuState {
        MenuState::from_index(self.current)
    }

    fn draw(&self, ctx: &MenuContext) {
        let state = &self.table[self.current];
        if let Err(e) = (state.draw)(ctx) {
            warn!("Menu: drawing {} failed: {}", state.name, e);
        }
    }
}

/// Build the menu's state table.
pub fn build_menu_table() -> [MenuStateDescriptor; MenuState::COUNT] {
    [
        MenuStateDescriptor {
            id: MenuState::Init,
            name: "Init",
            on_event: idle_event,
            draw: draw_init,
        },
        MenuStateDescriptor {
            id: MenuState::Preempted,
            name: "Preempted",
            on_event: preempted_event,
            draw: draw_preempted,
        },
        MenuStateDescriptor {
            id: MenuState::HeatingConstant,
            name: "HeatingConstant",
            on_event: constant_event,
            draw: draw_constant,
        },
        MenuStateDescriptor {
            id: MenuState::TemperatureSet,
            name: "TemperatureSet",
            on_event: temperature_set_event,
            draw: draw_temperature_set,
        },
        MenuStateDescriptor {
            id: MenuState::TimeSet,
            name: "TimeSet",
            on_event: time_set_event,
            draw: draw_time_set,
        },
        MenuStateDescriptor {
            id: MenuState::Jedec,
            name: "Jedec",
            on_event: jedec_event,
            draw: draw_jedec,
        },
        MenuStateDescriptor {
            id: MenuState::Wait,
            name: "Wait",
            on_event: wait_event,
            draw: draw_wait,
        },
        MenuStateDescriptor {
            id: MenuState::Done,
            name: "Done",
            on_event: idle_event,
            draw: draw_done,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  Handlers
// ═══════════════════════════════════════════════════════════════════════════

/// Init and Done: wait for the user.
fn idle_event(_ctx: &mut MenuContext, event: MenuEvent) -> Option<MenuState> {
    match event {
        MenuEvent::Push => Some(MenuState::HeatingConstant),
        MenuEvent::PreemptRequest => Some(MenuState::Preempted),
        _ => None,
    }
}

fn preempted_event(_ctx: &mut MenuContext, event: MenuEvent) -> Option<MenuState> {
    (event == MenuEvent::PreemptTake).then_some(MenuState::HeatingConstant)
}

/// Mode selection shared by the Constant and Jedec screens.
fn select_event(event: MenuEvent) -> Option<MenuState> {
    match event {
        MenuEvent::Up => Some(MenuState::HeatingConstant),
        MenuEvent::Down => Some(MenuState::Jedec),
        MenuEvent::PreemptRequest => Some(MenuState::Preempted),
        _ => None,
    }
}

fn constant_event(_ctx: &mut MenuContext, event: MenuEvent) -> Option<MenuState> {
    match event {
        MenuEvent::Push => Some(MenuState::TemperatureSet),
        other => select_event(other),
    }
}

fn jedec_event(ctx: &mut MenuContext, event: MenuEvent) -> Option<MenuState> {
    match event {
        MenuEvent::Push => ctx
            .send(HeatRequest::Profile(ProfileId::Jedec))
            .then_some(MenuState::Wait),
        other => select_event(other),
    }
}

fn temperature_set_event(ctx: &mut MenuContext, event: MenuEvent) -> Option<MenuState> {
    match event {
        MenuEvent::Up => {
            ctx.temperature_c = ctx.temperature_c.saturating_add(1);
            None
        }
        MenuEvent::Down => {
            ctx.temperature_c = ctx.temperature_c.saturating_sub(1);
            None
        }
        MenuEvent::Push => Some(MenuState::TimeSet),
        MenuEvent::PreemptRequest => Some(MenuState::Preempted),
        _ => None,
    }
}

fn time_set_event(ctx: &mut MenuContext, event: MenuEvent) -> Option<MenuState> {
    match event {
        MenuEvent::Up => {
            ctx.duration_s = ctx.duration_s.saturating_add(1);
            None
        }
        MenuEvent::Down => {
            ctx.duration_s = ctx.duration_s.saturating_sub(1);
            None
        }
        MenuEvent::Push => {
            let request = HeatRequest::Constant {
                temperature_c: ctx.temperature_c,
                duration_s: ctx.duration_s,
            };
            ctx.send(request).then_some(MenuState::Wait)
        }
        MenuEvent::PreemptRequest => Some(MenuState::Preempted),
        _ => None,
    }
}

fn wait_event(_ctx: &mut MenuContext, event: MenuEvent) -> Option<MenuState> {
    match event {
        MenuEvent::RequestDone => Some(MenuState::Done),
        MenuEvent::PreemptRequest => Some(MenuState::Preempted),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Screens
// ═══════════════════════════════════════════════════════════════════════════

const TEMPERATURE_LABEL: &str = "temperature:";
const TIME_LABEL: &str = "time:";

/// Column of a value printed after `label` and one blank.
const fn value_column(label: &str) -> u8 {
    label.len() as u8 + 1
}

fn screen(ctx: &MenuContext, first: &str, second: Option<&str>) -> Result<()> {
    ctx.display.clear()?;
    ctx.display.print(0, 0, format_args!("{first}"))?;
    if let Some(second) = second {
        ctx.display.print(1, 0, format_args!("{second}"))?;
    }
    Ok(())
}

fn draw_init(ctx: &MenuContext) -> Result<()> {
    ctx.display.clear()?;
    ctx.display.print(0, 3, format_args!("ThermoPlate"))
}

fn draw_preempted(ctx: &MenuContext) -> Result<()> {
    screen(ctx, "BLE control", None)
}

fn draw_constant(ctx: &MenuContext) -> Result<()> {
    screen(ctx, "Constant", Some("temperature"))
}

fn draw_jedec(ctx: &MenuContext) -> Result<()> {
    screen(ctx, "JEDEC", None)
}

fn draw_temperature_set(ctx: &MenuContext) -> Result<()> {
    screen(ctx, "Set", Some(TEMPERATURE_LABEL))?;
    ctx.display.print(
        1,
        value_column(TEMPERATURE_LABEL),
        format_args!("{}", ctx.temperature_c),
    )
}

fn draw_time_set(ctx: &MenuContext) -> Result<()> {
    screen(ctx, "Set", Some(TIME_LABEL))?;
    ctx.display.print(
        1,
        value_column(TIME_LABEL),
        format_args!("{}", ctx.duration_s),
    )
}

fn draw_wait(ctx: &MenuContext) -> Result<()> {
    screen(ctx, "Running...", None)
}

fn draw_done(ctx: &MenuContext) -> Result<()> {
    screen(ctx, "Done", None)
}

// ---------------------------------------------------------------------------
// Scheduler binding
// ---------------------------------------------------------------------------

struct MenuMachine {
    fsm: MenuFsm,
    ctx: MenuContext,
}

/// The menu as a menu-queue subscriber.
pub struct Menu {
    machine: Mutex<MenuMachine>,
}

impl Menu {
    pub fn new(display: Display, requests: QueueHandle<HeatRequest>) -> Arc<Self> {
        Arc::new(Self {
            machine: Mutex::new(MenuMachine {
                fsm: MenuFsm::new(build_menu_table(), MenuState::Init),
                ctx: MenuContext::new(display, requests),
            }),
        })
    }

    /// Draw the initial screen and subscribe to `events`.
    pub fn attach(self: &Arc<Self>, events: &QueueHandle<MenuEvent>) -> Result<SubscriptionHandle> {
        {
            let machine = self.lock();
            machine.fsm.start(&machine.ctx);
        }
        let menu = Arc::clone(self);
        events
            .subscribe(move |event| menu.handle_event(*event))
            .ok_or(Error::CollectionFull)
    }

    pub fn handle_event(&self, event: MenuEvent) {
        debug!("Menu: {:?}", event);
        let machine = &mut *self.lock();
        machine.fsm.handle(&mut machine.ctx, event);
    }

    pub fn state(&self) -> MenuState {
        self.lock().fsm.current_state()
    }

    /// Constant-mode values as currently edited: (°C, seconds).
    pub fn settings(&self) -> (u16, u32) {
        let machine = self.lock();
        (machine.ctx.temperature_c, machine.ctx.duration_s)
    }

    fn lock(&self) -> MutexGuard<'_, MenuMachine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
