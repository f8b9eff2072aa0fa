//! Timer service: periodic ticks, one-shot deferred actions and the
//! soft-IRQ bridge out of interrupt context.
//!
//! Everything here fires on one serialized execution context, the timer
//! thread started by [`TimerService::start`].  That context runs
//! concurrently with the scheduler's consumer loop.
//!
//! ```text
//!   ISR ──soft_irq_from_isr──▶ ┌──────────────┐
//!   task ──soft_irq──────────▶ │ soft-IRQ ring│──┐
//!                              └──────────────┘  │
//!   periodic[i] deadline ─────────────────────────┼──▶ timer thread
//!   oneshot[j] deadline ──────────────────────────┘     fire_*()
//! ```
//!
//! Periodic callback lists are guarded by a per-timer lock taken with a
//! bounded wait; a contended register/unregister fails with
//! [`Error::Timeout`] instead of blocking.  Dispatch snapshots the list and
//! invokes callbacks without the lock, and hands each callback its own
//! [`CallbackHandle`] so it can unregister itself mid-tick.

mod service;
pub mod units;

use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use heapless::mpmc::MpMcQueue;
use log::{debug, info, warn};

use crate::error::{Error, Result};

/// Callback slots per periodic timer.
pub const MAX_TIMER_CALLBACKS: usize = 2;
pub const MAX_PERIODIC_TIMERS: usize = 4;
pub const MAX_ONESHOT_TIMERS: usize = 4;
/// Bound on acquiring a periodic timer's callback lock.
pub const ROUTINE_LOCK_WAIT: Duration = Duration::from_millis(1000);
/// Depth of the soft-IRQ ring (power of two).
pub const SOFT_IRQ_DEPTH: usize = 16;

const LOCK_RETRY: Duration = Duration::from_millis(1);

// ═══════════════════════════════════════════════════════════════
//  Declarations and handles
// ═══════════════════════════════════════════════════════════════

/// Declaration of an auto-starting, recurring timer.
#[derive(Debug, Clone, Copy)]
pub struct PeriodicTimerDef {
    pub name: &'static str,
    pub period_ms: u32,
}

/// Declaration of a one-shot timer, dormant until armed.
#[derive(Debug, Clone, Copy)]
pub struct OneshotTimerDef {
    pub name: &'static str,
}

/// Index into the periodic declaration table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeriodicTimerId(pub usize);

/// Index into the one-shot declaration table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OneshotTimerId(pub usize);

/// Opaque token for one periodic registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle {
    timer: PeriodicTimerId,
    serial: u32,
}

impl CallbackHandle {
    pub fn timer(&self) -> PeriodicTimerId {
        self.timer
    }
}

/// Periodic callback.  The argument is whatever the closure captures.
pub type PeriodicCallback = Arc<dyn Fn(CallbackHandle) + Send + Sync>;
/// One-shot callback, consumed when it fires.
pub type OneshotCallback = Box<dyn FnOnce() + Send>;
/// Deferred routine: `routine(arg, word)`.  Plain data only, so it can be
/// queued from an interrupt handler.
pub type SoftIrqRoutine = fn(usize, u32);

// ═══════════════════════════════════════════════════════════════
//  Timer tables
// ═══════════════════════════════════════════════════════════════

struct PeriodicSlot {
    handle: CallbackHandle,
    callback: PeriodicCallback,
}

struct PeriodicTimer {
    name: &'static str,
    period_ms: u32,
    slots: Mutex<[Option<PeriodicSlot>; MAX_TIMER_CALLBACKS]>,
}

struct PendingShot {
    callback: OneshotCallback,
    delay_ms: u32,
    due: Instant,
}

struct OneshotTimer {
    name: &'static str,
    pending: Mutex<Option<PendingShot>>,
}

#[derive(Clone, Copy)]
struct SoftIrq {
    routine: SoftIrqRoutine,
    arg: usize,
    word: u32,
}

/// Owner of all timers and of the timer execution context.
pub struct TimerService {
    periodic: heapless::Vec<PeriodicTimer, MAX_PERIODIC_TIMERS>,
    oneshot: heapless::Vec<OneshotTimer, MAX_ONESHOT_TIMERS>,
    soft_irqs: MpMcQueue<SoftIrq, SOFT_IRQ_DEPTH>,
    next_serial: AtomicU32,
    lock_wait: Duration,
    thread: service::ServiceThread,
}

impl TimerService {
    /// Build the timer tables.  Periodic timers start ticking and one-shot
    /// timers become armable once [`start`](Self::start) runs.
    pub fn new(periodic: &[PeriodicTimerDef], oneshot: &[OneshotTimerDef]) -> Result<Self> {
        let mut periodic_timers = heapless::Vec::new();
        for def in periodic {
            if def.period_ms == 0 {
                warn!("Timer: '{}' declared with zero period", def.name);
                return Err(Error::InvalidInputParameter);
            }
            periodic_timers
                .push(PeriodicTimer {
                    name: def.name,
                    period_ms: def.period_ms,
                    slots: Mutex::new(core::array::from_fn(|_| None)),
                })
                .map_err(|_| Error::CollectionFull)?;
        }

        let mut oneshot_timers = heapless::Vec::new();
        for def in oneshot {
            oneshot_timers
                .push(OneshotTimer {
                    name: def.name,
                    pending: Mutex::new(None),
                })
                .map_err(|_| Error::CollectionFull)?;
        }

        info!(
            "Timer: {} periodic + {} one-shot timers declared",
            periodic_timers.len(),
            oneshot_timers.len()
        );

        Ok(Self {
            periodic: periodic_timers,
            oneshot: oneshot_timers,
            soft_irqs: MpMcQueue::new(),
            next_serial: AtomicU32::new(1),
            lock_wait: ROUTINE_LOCK_WAIT,
            thread: service::ServiceThread::new(),
        })
    }

    /// Override the bound on callback-list lock acquisition.
    pub fn with_lock_wait(mut self, bound: Duration) -> Self {
        self.lock_wait = bound;
        self
    }

    /// Tick length of `timer`.
    pub fn period_ms(&self, timer: PeriodicTimerId) -> Result<u32> {
        self.periodic
            .get(timer.0)
            .map(|t| t.period_ms)
            .ok_or(Error::UnknownResource)
    }

    // ── Periodic callbacks ────────────────────────────────────

    /// Store `callback` in the first free slot of `timer`.
    pub fn register_periodic_callback(
        &self,
        timer: PeriodicTimerId,
        callback: impl Fn(CallbackHandle) + Send + Sync + 'static,
    ) -> Result<CallbackHandle> {
        let entry = self.periodic.get(timer.0).ok_or(Error::UnknownResource)?;
        let mut slots = lock_within(&entry.slots, self.lock_wait).inspect_err(|_| {
            warn!("Timer: '{}' callback lock timed out (register)", entry.name);
        })?;

        let Some((index, slot)) = slots.iter_mut().enumerate().find(|(_, s)| s.is_none()) else {
            warn!("Timer: '{}' has no free callback slot", entry.name);
            return Err(Error::CollectionFull);
        };
        let handle = CallbackHandle {
            timer,
            serial: self.next_serial.fetch_add(1, Ordering::Relaxed),
        };
        *slot = Some(PeriodicSlot {
            handle,
            callback: Arc::new(callback),
        });
        debug!("Timer: '{}' callback registered at slot {}", entry.name, index);
        Ok(handle)
    }

    /// Clear the slot holding `handle`.
    pub fn unregister_periodic_callback(&self, handle: CallbackHandle) -> Result<()> {
        let entry = self
            .periodic
            .get(handle.timer.0)
            .ok_or(Error::UnknownResource)?;
        let mut slots = lock_within(&entry.slots, self.lock_wait).inspect_err(|_| {
            warn!("Timer: '{}' callback lock timed out (unregister)", entry.name);
        })?;

        let slot = slots
            .iter_mut()
            .find(|s| s.as_ref().is_some_and(|s| s.handle == handle))
            .ok_or(Error::UnknownResource)?;
        *slot = None;
        debug!("Timer: '{}' callback unregistered", entry.name);
        Ok(())
    }

    /// Run one tick of `timer`: every registered callback in slot order.
    pub fn fire_periodic(&self, timer: PeriodicTimerId) {
        let Some(entry) = self.periodic.get(timer.0) else {
            return;
        };
        let due: heapless::Vec<(CallbackHandle, PeriodicCallback), MAX_TIMER_CALLBACKS> =
            lock(&entry.slots)
                .iter()
                .flatten()
                .map(|s| (s.handle, Arc::clone(&s.callback)))
                .collect();
        for (handle, callback) in due {
            callback(handle);
        }
    }

    /// Number of occupied callback slots on `timer`.
    pub fn registered_callbacks(&self, timer: PeriodicTimerId) -> usize {
        self.periodic
            .get(timer.0)
            .map_or(0, |t| lock(&t.slots).iter().flatten().count())
    }

    // ── One-shot timers ───────────────────────────────────────

    /// Fire `callback` once after `delay_ms`.  Re-arming before expiry
    /// discards the earlier callback.
    pub fn oneshot_arm(
        &self,
        timer: OneshotTimerId,
        delay_ms: u32,
        callback: impl FnOnce() + Send + 'static,
    ) -> Result<()> {
        let entry = self.oneshot.get(timer.0).ok_or(Error::UnknownResource)?;
        if delay_ms == 0 {
            return Err(Error::InvalidInputParameter);
        }
        let previous = lock(&entry.pending).replace(PendingShot {
            callback: Box::new(callback),
            delay_ms,
            due: Instant::now() + Duration::from_millis(u64::from(delay_ms)),
        });
        if previous.is_some() {
            debug!("Timer: '{}' re-armed, earlier shot discarded", entry.name);
        }
        self.thread.kick();
        Ok(())
    }

    /// Fire `timer` now if it is armed.  Returns whether a callback ran.
    pub fn fire_oneshot(&self, timer: OneshotTimerId) -> bool {
        match self.take_shot(timer, None) {
            Some(shot) => {
                (shot.callback)();
                true
            }
            None => false,
        }
    }

    /// Drop the pending shot on `timer` without running it.  Returns
    /// whether one was armed.
    pub fn oneshot_disarm(&self, timer: OneshotTimerId) -> Result<bool> {
        let entry = self.oneshot.get(timer.0).ok_or(Error::UnknownResource)?;
        let dropped = lock(&entry.pending).take().is_some();
        if dropped {
            debug!("Timer: '{}' disarmed", entry.name);
        }
        Ok(dropped)
    }

    /// Delay of the pending shot on `timer`, if armed.
    pub fn pending_delay_ms(&self, timer: OneshotTimerId) -> Option<u32> {
        self.oneshot
            .get(timer.0)
            .and_then(|t| lock(&t.pending).as_ref().map(|p| p.delay_ms))
    }

    fn take_shot(&self, timer: OneshotTimerId, now: Option<Instant>) -> Option<PendingShot> {
        let entry = self.oneshot.get(timer.0)?;
        let mut pending = lock(&entry.pending);
        let not_due = match (pending.as_ref(), now) {
            (Some(shot), Some(now)) => shot.due > now,
            _ => false,
        };
        if not_due { None } else { pending.take() }
    }

    fn next_oneshot_due(&self) -> Option<Instant> {
        self.oneshot
            .iter()
            .filter_map(|t| lock(&t.pending).as_ref().map(|p| p.due))
            .min()
    }

    // ── Soft IRQ ──────────────────────────────────────────────

    /// Defer `routine(arg, word)` onto the timer context and wake it.
    pub fn soft_irq(&self, routine: SoftIrqRoutine, arg: usize, word: u32) -> Result<()> {
        self.soft_irq_from_isr(routine, arg, word)?;
        self.thread.kick();
        Ok(())
    }

    /// Interrupt-safe variant of [`soft_irq`](Self::soft_irq).  Touches
    /// only the lock-free ring; the timer thread polls it every few
    /// milliseconds.
    pub fn soft_irq_from_isr(&self, routine: SoftIrqRoutine, arg: usize, word: u32) -> Result<()> {
        self.soft_irqs
            .enqueue(SoftIrq { routine, arg, word })
            .map_err(|_| Error::CollectionFull)
    }

    /// Execute queued soft IRQs in submission order.
    pub fn run_soft_irqs(&self) -> usize {
        let mut ran = 0;
        while let Some(irq) = self.soft_irqs.dequeue() {
            (irq.routine)(irq.arg, irq.word);
            ran += 1;
        }
        ran
    }
}

/// Acquire `mutex`, giving up after `bound`.
fn lock_within<T>(mutex: &Mutex<T>, bound: Duration) -> Result<MutexGuard<'_, T>> {
    let deadline = Instant::now() + bound;
    loop {
        match mutex.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(poisoned)) => return Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => {
                if Instant::now() >= deadline {
                    return Err(Error::Timeout);
                }
                std::thread::sleep(LOCK_RETRY);
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
