//! The timer execution context: one service thread that fires periodic
//! deadlines, expired one-shots and queued soft IRQs, in that order, then
//! parks until the next deadline.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{JoinHandle, Thread};
use std::time::{Duration, Instant};

use log::{info, warn};

use super::{lock, OneshotTimerId, PeriodicTimerId, TimerService, MAX_PERIODIC_TIMERS};
use crate::drivers::task_pin::{spawn_task, TaskSpec};
use crate::error::{Error, Result};

/// Longest the thread sleeps without checking the soft-IRQ ring.
const SOFT_IRQ_POLL: Duration = Duration::from_millis(10);

const TIMER_TASK: TaskSpec = TaskSpec {
    name: "timer-svc\0",
    priority: 10,
    stack_kb: 8,
};

pub(super) struct ServiceThread {
    thread: OnceLock<Thread>,
    join: Mutex<Option<JoinHandle<()>>>,
    stop: AtomicBool,
}

impl ServiceThread {
    pub(super) fn new() -> Self {
        Self {
            thread: OnceLock::new(),
            join: Mutex::new(None),
            stop: AtomicBool::new(false),
        }
    }

    /// Wake the service thread early.  No-op before `start`.
    pub(super) fn kick(&self) {
        if let Some(thread) = self.thread.get() {
            thread.unpark();
        }
    }
}

impl TimerService {
    /// Start the timer context: periodic timers begin ticking, armed
    /// one-shots and soft IRQs are serviced.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut join = lock(&self.thread.join);
        if join.is_some() {
            return Err(Error::InvalidState);
        }
        let svc = Arc::clone(self);
        let handle = spawn_task(&TIMER_TASK, move || service_loop(&svc))?;
        // Set before anyone can observe the join handle, so kick() works
        // as soon as start() returns.
        let _ = self.thread.thread.set(handle.thread().clone());
        *join = Some(handle);
        info!("Timer: service thread started");
        Ok(())
    }

    /// Stop and join the service thread.
    pub fn shutdown(&self) {
        self.thread.stop.store(true, Ordering::Release);
        self.thread.kick();
        let handle = lock(&self.thread.join).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Timer: service thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.thread.join).is_some() && !self.thread.stop.load(Ordering::Acquire)
    }
}

fn service_loop(svc: &TimerService) {
    let started = Instant::now();
    let mut deadlines: heapless::Vec<Instant, MAX_PERIODIC_TIMERS> = svc
        .periodic
        .iter()
        .map(|t| started + period(t.period_ms))
        .collect();

    while !svc.thread.stop.load(Ordering::Acquire) {
        svc.run_soft_irqs();

        let now = Instant::now();
        for (i, deadline) in deadlines.iter_mut().enumerate() {
            if *deadline <= now {
                svc.fire_periodic(PeriodicTimerId(i));
                let step = period(svc.periodic[i].period_ms);
                // Skip missed ticks rather than bursting.
                while *deadline <= now {
                    *deadline += step;
                }
            }
        }

        for i in 0..svc.oneshot.len() {
            if let Some(shot) = svc.take_shot(OneshotTimerId(i), Some(now)) {
                (shot.callback)();
            }
        }

        let mut wake_at = Instant::now() + SOFT_IRQ_POLL;
        for deadline in &deadlines {
            wake_at = wake_at.min(*deadline);
        }
        if let Some(due) = svc.next_oneshot_due() {
            wake_at = wake_at.min(due);
        }
        std::thread::park_timeout(wake_at.saturating_duration_since(Instant::now()));
    }
    info!("Timer: service thread stopped");
}

fn period(ms: u32) -> Duration {
    Duration::from_millis(u64::from(ms))
}
