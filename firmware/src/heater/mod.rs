//! Heat controller: runs constant or staged heating profiles as a
//! periodic callback on the controller tick timer.
//!
//! ```text
//!              start_*()                      tick: profile done
//!   ┌──────┐ ───────────▶ ┌─────────────────┐ ──────────────────▶ ┌──────┐
//!   │ Idle │              │ Constant /      │                     │ Idle │
//!   └──────┘ ◀─────────── │ MultiStage      │                     └──────┘
//!        next tick or     └────────┬────────┘
//!        next start_*()            │ cancel()
//!                                  ▼
//!                           ┌─────────────┐
//!                           │  Cancelled  │ (request only)
//!                           └─────────────┘
//! ```
//!
//! Each step reads the thermocouple, picks the active stage, asks the
//! power calculator for a duty percentage, switches the heater on and arms
//! the duty one-shot to switch it off part-way through the tick.
//!
//! Cancellation is cooperative: [`HeatController::cancel`] only records the
//! request and the next tick (or the next start) performs the shutdown,
//! so it takes effect within one tick period.
//!
//! A sensor failure switches the heater off and unregisters the tick; the
//! run then stays in its active state without completing until it is
//! cancelled.

pub mod profile;

pub use profile::{HeatingProfile, JEDEC_STAGES, ProfileId, TemperatureStage};

use core::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use log::{debug, info, warn};

use crate::app::ports::{HeaterSwitch, TemperatureSensor};
use crate::control::PowerCalculator;
use crate::error::{Error, Result};
use crate::timer::units::ms_to_secs_f32;
use crate::timer::{CallbackHandle, OneshotTimerId, PeriodicTimerId, TimerService};

/// Logical controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeatingState {
    Idle,
    Constant,
    MultiStage,
    /// Cancellation requested; resolved by the next tick or start.
    Cancelled,
}

/// How a run ended, passed to its completion callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeatOutcome {
    Completed,
    Cancelled,
}

pub type CompletionCallback = Box<dyn FnOnce(HeatOutcome) + Send>;

struct ControllerCore {
    state: HeatingState,
    profile: Option<HeatingProfile>,
    on_complete: Option<CompletionCallback>,
    tick_callback: Option<CallbackHandle>,
    /// Bumped on every start; duty shots from older runs are ignored.
    run: u32,
    sensor: Box<dyn TemperatureSensor>,
    heater: Box<dyn HeaterSwitch>,
    power: PowerCalculator,
}

/// Result of a step taken under the lock.  The tick registration is
/// released and then the completion callback runs, both after the lock is
/// dropped.
struct Step {
    result: Result<()>,
    release: Option<CallbackHandle>,
    completion: Option<(CompletionCallback, HeatOutcome)>,
}

impl Step {
    fn done(result: Result<()>) -> Self {
        Self {
            result,
            release: None,
            completion: None,
        }
    }
}

pub struct HeatController {
    me: Weak<HeatController>,
    timers: Arc<TimerService>,
    tick_timer: PeriodicTimerId,
    duty_timer: OneshotTimerId,
    last_reading: AtomicU16,
    core: Mutex<ControllerCore>,
}

impl HeatController {
    pub fn new(
        timers: Arc<TimerService>,
        tick_timer: PeriodicTimerId,
        duty_timer: OneshotTimerId,
        sensor: impl TemperatureSensor + 'static,
        heater: impl HeaterSwitch + 'static,
        power: PowerCalculator,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            timers,
            tick_timer,
            duty_timer,
            last_reading: AtomicU16::new(0),
            core: Mutex::new(ControllerCore {
                state: HeatingState::Idle,
                profile: None,
                on_complete: None,
                tick_callback: None,
                run: 0,
                sensor: Box::new(sensor),
                heater: Box::new(heater),
                power,
            }),
        })
    }

    /// Force the heater off and seed the cached reading.
    pub fn init(&self) -> Result<()> {
        let mut core = self.lock_core();
        core.heater.set_on(false)?;
        let reading = core.sensor.read_celsius()?;
        self.last_reading.store(reading, Ordering::Release);
        info!("HeatController: ready, plate at {} C", reading);
        Ok(())
    }

    /// Last cached sensor reading (degrees Celsius).
    pub fn get_temperature(&self) -> u16 {
        self.last_reading.load(Ordering::Acquire)
    }

    pub fn state(&self) -> HeatingState {
        self.lock_core().state
    }

    /// Run the built-in profile `profile`.
    pub fn start_multistage(
        &self,
        profile: ProfileId,
        on_complete: impl FnOnce(HeatOutcome) + Send + 'static,
    ) -> Result<()> {
        let profile = HeatingProfile::builtin(profile)?;
        self.begin(HeatingState::MultiStage, profile, Box::new(on_complete))
    }

    /// Hold `temperature_c` for `duration_s` seconds.
    pub fn start_constant(
        &self,
        temperature_c: u16,
        duration_s: u32,
        on_complete: impl FnOnce(HeatOutcome) + Send + 'static,
    ) -> Result<()> {
        let profile = HeatingProfile::constant(temperature_c, duration_s)?;
        self.begin(HeatingState::Constant, profile, Box::new(on_complete))
    }

    /// Request cancellation of the active run.  Takes effect on the next
    /// tick; a no-op when idle.
    pub fn cancel(&self) -> Result<()> {
        let mut core = self.lock_core();
        if matches!(core.state, HeatingState::Constant | HeatingState::MultiStage) {
            info!("HeatController: cancel requested in {:?}", core.state);
            core.state = HeatingState::Cancelled;
        }
        Ok(())
    }

    /// One controller tick: resolve a pending cancel or run a control step.
    ///
    /// `Err(ExecutionStopped)` means the run is over and the periodic
    /// registration should go; any other error means it stalled.
    pub fn tick(&self) -> Result<()> {
        let tick_ms = self.timers.period_ms(self.tick_timer)?;
        let step = {
            let mut core = self.lock_core();
            match core.state {
                HeatingState::Cancelled => self.finalize_cancel(&mut core),
                HeatingState::Idle => Step::done(Err(Error::ExecutionStopped)),
                HeatingState::Constant | HeatingState::MultiStage => {
                    self.step_locked(&mut core, tick_ms)
                }
            }
        };
        self.complete(step)
    }

    // ── internals ─────────────────────────────────────────────

    fn begin(&self, mode: HeatingState, profile: HeatingProfile, on_complete: CompletionCallback) -> Result<()> {
        self.resolve_pending_cancel();
        let tick_ms = self.timers.period_ms(self.tick_timer)?;

        let step = {
            let mut core = self.lock_core();
            if core.state != HeatingState::Idle {
                warn!("HeatController: start refused in {:?}", core.state);
                return Err(Error::InvalidState);
            }
            self.disarm_duty();
            core.run = core.run.wrapping_add(1);
            core.profile = Some(profile);
            core.on_complete = Some(on_complete);
            core.state = mode;
            core.power.reset();
            info!("HeatController: starting {:?} (run {})", mode, core.run);
            self.step_locked(&mut core, tick_ms)
        };

        match self.complete(step) {
            Ok(()) => {}
            Err(Error::ExecutionStopped) => return Ok(()),
            Err(e) => warn!("HeatController: first step failed ({}), scheduling anyway", e),
        }

        // Registered under the core lock so a tick cannot run before the
        // handle is recorded.
        let mut core = self.lock_core();
        if core.state == HeatingState::Idle {
            return Ok(());
        }
        let me = self.me.clone();
        let registered = self
            .timers
            .register_periodic_callback(self.tick_timer, move |handle| {
                if let Some(ctrl) = me.upgrade() {
                    ctrl.on_periodic_tick(handle);
                }
            });
        match registered {
            Ok(handle) => {
                core.tick_callback = Some(handle);
                Ok(())
            }
            Err(e) => {
                warn!("HeatController: tick registration failed ({}), aborting", e);
                if let Err(off) = core.heater.set_on(false) {
                    warn!("HeatController: heater off failed: {}", off);
                }
                self.disarm_duty();
                core.state = HeatingState::Idle;
                core.profile = None;
                core.on_complete = None;
                Err(e)
            }
        }
    }

    /// Periodic-callback wrapper around [`tick`](Self::tick).
    fn on_periodic_tick(&self, handle: CallbackHandle) {
        let Err(e) = self.tick() else {
            return;
        };
        if e.is_failure() {
            warn!("HeatController: step failed ({}), profile stalled", e);
        }
        // A finished or cancelled run has already released its slot.
        let stalled = {
            let mut core = self.lock_core();
            if core.tick_callback == Some(handle) {
                core.tick_callback.take()
            } else {
                None
            }
        };
        if let Some(handle) = stalled {
            self.release_tick(handle);
        }
    }

    fn step_locked(&self, core: &mut ControllerCore, tick_ms: u32) -> Step {
        let ControllerCore {
            state,
            profile,
            on_complete,
            tick_callback,
            run: run_id,
            sensor,
            heater,
            power,
            ..
        } = core;

        let reading = match sensor.read_celsius() {
            Ok(r) => r,
            Err(e) => {
                warn!("HeatController: sensor read failed: {}", e);
                if let Err(off) = heater.set_on(false) {
                    warn!("HeatController: heater off failed: {}", off);
                }
                return Step::done(Err(Error::CommunicationError));
            }
        };
        self.last_reading.store(reading, Ordering::Release);

        let Some(run) = profile.as_mut() else {
            return Step::done(Err(Error::InvalidState));
        };

        let Some(stage) = run.locate_stage() else {
            info!("HeatController: profile complete after {} s", run.elapsed_secs());
            if let Err(off) = heater.set_on(false) {
                warn!("HeatController: heater off failed: {}", off);
            }
            self.disarm_duty();
            run.reset();
            *profile = None;
            *state = HeatingState::Idle;
            return Step {
                result: Err(Error::ExecutionStopped),
                release: tick_callback.take(),
                completion: on_complete.take().map(|cb| (cb, HeatOutcome::Completed)),
            };
        };

        let percent = power.compute(
            f32::from(reading),
            f32::from(stage.target_c),
            ms_to_secs_f32(tick_ms),
        );
        if let Err(e) = heater.set_on(true) {
            return Step::done(Err(e));
        }
        run.advance(tick_ms);

        let on_ms = (percent / 100.0 * tick_ms as f32).round() as u32;
        debug!(
            "HeatController: {} C -> {} C, power {:.1}%, on for {} ms",
            reading, stage.target_c, percent, on_ms
        );
        if on_ms > 0 && on_ms < tick_ms {
            let me = self.me.clone();
            let pulse_of = *run_id;
            let armed = self.timers.oneshot_arm(self.duty_timer, on_ms, move || {
                if let Some(ctrl) = me.upgrade() {
                    ctrl.end_duty_pulse(pulse_of);
                }
            });
            if let Err(e) = armed {
                warn!("HeatController: duty timer arm failed: {}", e);
            }
        }
        Step::done(Ok(()))
    }

    fn end_duty_pulse(&self, run: u32) {
        let mut core = self.lock_core();
        if core.run != run {
            debug!("HeatController: duty shot of run {} ignored", run);
            return;
        }
        if let Err(e) = core.heater.set_on(false) {
            warn!("HeatController: heater off failed: {}", e);
        }
    }

    /// Finish a cancelled run under the lock.
    fn finalize_cancel(&self, core: &mut ControllerCore) -> Step {
        if let Err(e) = core.heater.set_on(false) {
            warn!("HeatController: heater off failed: {}", e);
        }
        self.disarm_duty();
        core.state = HeatingState::Idle;
        core.profile = None;
        info!("HeatController: cancelled");
        Step {
            result: Err(Error::ExecutionStopped),
            release: core.tick_callback.take(),
            completion: core.on_complete.take().map(|cb| (cb, HeatOutcome::Cancelled)),
        }
    }

    fn resolve_pending_cancel(&self) {
        let step = {
            let mut core = self.lock_core();
            if core.state != HeatingState::Cancelled {
                return;
            }
            self.finalize_cancel(&mut core)
        };
        let _ = self.complete(step);
    }

    /// Release the tick slot, then run the completion callback, so a start
    /// chained from the callback finds the slot free.
    fn complete(&self, step: Step) -> Result<()> {
        if let Some(handle) = step.release {
            self.release_tick(handle);
        }
        if let Some((cb, outcome)) = step.completion {
            cb(outcome);
        }
        step.result
    }

    fn release_tick(&self, handle: CallbackHandle) {
        if let Err(e) = self.timers.unregister_periodic_callback(handle) {
            warn!("HeatController: tick unregister failed: {}", e);
        }
    }

    fn disarm_duty(&self) {
        if let Err(e) = self.timers.oneshot_disarm(self.duty_timer) {
            warn!("HeatController: duty timer disarm failed: {}", e);
        }
    }

    fn lock_core(&self) -> MutexGuard<'_, ControllerCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
