//! Timer service integration tests: callback slot bookkeeping, one-shot
//! arming and the live service thread.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thermoplate::config::{HEATER_DUTY, HEATER_TICK};
use thermoplate::error::Error;
use thermoplate::timer::{
    MAX_TIMER_CALLBACKS, OneshotTimerDef, OneshotTimerId, PeriodicTimerDef, PeriodicTimerId,
    TimerService,
};

use crate::mock_hw::{TICK_MS, bench_timers};

// ── Periodic callbacks ────────────────────────────────────────

#[test]
fn register_beyond_capacity_is_collection_full() {
    let timers = bench_timers();
    for _ in 0..MAX_TIMER_CALLBACKS {
        timers.register_periodic_callback(HEATER_TICK, |_| {}).unwrap();
    }
    assert_eq!(
        timers.register_periodic_callback(HEATER_TICK, |_| {}).err(),
        Some(Error::CollectionFull)
    );
    assert_eq!(timers.registered_callbacks(HEATER_TICK), MAX_TIMER_CALLBACKS);
}

#[test]
fn unregister_unknown_handle_is_unknown_resource() {
    let timers = bench_timers();
    let handle = timers.register_periodic_callback(HEATER_TICK, |_| {}).unwrap();
    timers.unregister_periodic_callback(handle).unwrap();
    assert_eq!(
        timers.unregister_periodic_callback(handle),
        Err(Error::UnknownResource)
    );
}

#[test]
fn undeclared_timer_is_unknown_resource() {
    let timers = bench_timers();
    assert_eq!(
        timers.register_periodic_callback(PeriodicTimerId(3), |_| {}).err(),
        Some(Error::UnknownResource)
    );
    assert_eq!(timers.period_ms(PeriodicTimerId(3)), Err(Error::UnknownResource));
    assert_eq!(timers.period_ms(HEATER_TICK), Ok(TICK_MS));
}

#[test]
fn freed_slot_is_reused() {
    let timers = bench_timers();
    let first = timers.register_periodic_callback(HEATER_TICK, |_| {}).unwrap();
    timers.register_periodic_callback(HEATER_TICK, |_| {}).unwrap();
    timers.unregister_periodic_callback(first).unwrap();
    let again = timers.register_periodic_callback(HEATER_TICK, |_| {}).unwrap();
    assert_ne!(again, first);
    assert_eq!(again.timer(), HEATER_TICK);
}

#[test]
fn callback_may_unregister_itself_during_a_tick() {
    let timers = bench_timers();
    let hits = Arc::new(AtomicUsize::new(0));
    let (t, h) = (Arc::clone(&timers), Arc::clone(&hits));
    timers
        .register_periodic_callback(HEATER_TICK, move |handle| {
            h.fetch_add(1, Ordering::SeqCst);
            t.unregister_periodic_callback(handle).unwrap();
        })
        .unwrap();

    timers.fire_periodic(HEATER_TICK);
    timers.fire_periodic(HEATER_TICK);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(timers.registered_callbacks(HEATER_TICK), 0);
}

// ── One-shots ─────────────────────────────────────────────────

#[test]
fn rearming_replaces_the_pending_shot() {
    let timers = bench_timers();
    let fired = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::clone(&fired);
    timers.oneshot_arm(HEATER_DUTY, 300, move || f.lock().unwrap().push("first")).unwrap();
    let f = Arc::clone(&fired);
    timers.oneshot_arm(HEATER_DUTY, 700, move || f.lock().unwrap().push("second")).unwrap();
    assert_eq!(timers.pending_delay_ms(HEATER_DUTY), Some(700));

    assert!(timers.fire_oneshot(HEATER_DUTY));
    assert!(!timers.fire_oneshot(HEATER_DUTY));
    assert_eq!(*fired.lock().unwrap(), vec!["second"]);
}

#[test]
fn zero_delay_and_unknown_oneshot_rejected() {
    let timers = bench_timers();
    assert_eq!(
        timers.oneshot_arm(HEATER_DUTY, 0, || {}),
        Err(Error::InvalidInputParameter)
    );
    assert_eq!(
        timers.oneshot_arm(OneshotTimerId(2), 10, || {}),
        Err(Error::UnknownResource)
    );
}

// ── Soft IRQs ─────────────────────────────────────────────────

static SOFT_IRQ_WORDS: AtomicU32 = AtomicU32::new(0);

fn accumulate(arg: usize, word: u32) {
    SOFT_IRQ_WORDS.fetch_add(word * arg as u32, Ordering::SeqCst);
}

#[test]
fn soft_irqs_run_in_submission_order_on_demand() {
    let timers = bench_timers();
    timers.soft_irq_from_isr(accumulate, 1, 5).unwrap();
    timers.soft_irq_from_isr(accumulate, 2, 10).unwrap();
    assert_eq!(timers.run_soft_irqs(), 2);
    assert_eq!(SOFT_IRQ_WORDS.load(Ordering::SeqCst), 25);
    assert_eq!(timers.run_soft_irqs(), 0);
}

// ── Service thread ────────────────────────────────────────────

#[test]
fn service_thread_drives_ticks_and_oneshots() {
    let timers = Arc::new(
        TimerService::new(
            &[PeriodicTimerDef {
                name: "fast",
                period_ms: 10,
            }],
            &[OneshotTimerDef { name: "shot" }],
        )
        .unwrap(),
    );
    let ticks = Arc::new(AtomicUsize::new(0));
    let t = Arc::clone(&ticks);
    timers
        .register_periodic_callback(PeriodicTimerId(0), move |_| {
            t.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    let shot = Arc::new(AtomicUsize::new(0));
    let s = Arc::clone(&shot);

    timers.start().unwrap();
    assert_eq!(timers.start(), Err(Error::InvalidState));
    timers
        .oneshot_arm(OneshotTimerId(0), 20, move || {
            s.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while (ticks.load(Ordering::SeqCst) < 3 || shot.load(Ordering::SeqCst) == 0)
        && Instant::now() < deadline
    {
        std::thread::sleep(Duration::from_millis(5));
    }
    timers.shutdown();

    assert!(ticks.load(Ordering::SeqCst) >= 3);
    assert_eq!(shot.load(Ordering::SeqCst), 1);
    assert!(!timers.is_running());
}
