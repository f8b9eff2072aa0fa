//! Event-dispatch scheduler.
//!
//! Decouples producers (interrupt handlers, the timer thread, the GATT
//! host task) from a single consumer context that runs all UI and
//! arbitration logic one callback at a time.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Producers                            │
//! │   ISR (enqueue_from_isr)     any task (enqueue)              │
//! │          │                          │                        │
//! │          ▼                          ▼                        │
//! │  ┌───────────────┐  ┌───────────────┐  ┌───────────────┐     │
//! │  │ queue 0 (MPMC)│  │ queue 1 (MPMC)│  │ queue N (MPMC)│     │
//! │  │ slots [0..S)  │  │ slots [0..S)  │  │ slots [0..S)  │     │
//! │  └───────┬───────┘  └───────┬───────┘  └───────┬───────┘     │
//! │          └──────── WakeSignal (pending count) ─┘             │
//! │                           │                                  │
//! │                           ▼                                  │
//! │            Scheduler::run()  (single consumer)               │
//! │     drains queues in declaration order, subscribers in       │
//! │     slot order                                               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Queues are declared from [`QueueDescriptor`] constants before
//! [`Scheduler::init`]; each declaration returns a cloneable
//! [`QueueHandle`] that producers keep.  Backing storage is a fixed
//! lock-free ring sized by the descriptor, so steady-state operation never
//! allocates.

use core::marker::PhantomData;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use heapless::mpmc::MpMcQueue;
use log::{debug, info, warn};

use crate::error::{Error, Result};

/// Maximum number of queues a scheduler can own.
pub const MAX_QUEUES: usize = 8;

/// Upper bound on how long an interrupt-raised wake can go unnoticed.
/// `enqueue_from_isr` cannot signal the condition variable, so the consumer
/// re-checks the pending count at this interval.
const ISR_WAKE_POLL: Duration = Duration::from_millis(10);

// ═══════════════════════════════════════════════════════════════
//  Queue declarations
// ═══════════════════════════════════════════════════════════════

/// Compile-time declaration of one queue: name, item type, capacity
/// (`CAP`, a power of two) and subscriber slot count (`SLOTS`).
pub struct QueueDescriptor<T, const CAP: usize, const SLOTS: usize> {
    pub name: &'static str,
    _item: PhantomData<fn() -> T>,
}

impl<T, const CAP: usize, const SLOTS: usize> QueueDescriptor<T, CAP, SLOTS> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _item: PhantomData,
        }
    }

    pub const fn capacity(&self) -> usize {
        CAP
    }

    pub const fn slots(&self) -> usize {
        SLOTS
    }
}

/// Opaque token returned by [`QueueHandle::subscribe`]; required to
/// unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u32);

type Subscriber<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct SubscriberSlot<T> {
    handle: SubscriptionHandle,
    callback: Subscriber<T>,
}

// ═══════════════════════════════════════════════════════════════
//  Wake signal
// ═══════════════════════════════════════════════════════════════

/// Counting wake-up shared by every queue of one scheduler.
struct WakeSignal {
    pending: AtomicU32,
    lock: Mutex<()>,
    cond: Condvar,
}

impl WakeSignal {
    fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
            lock: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    fn raise(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        let _guard = lock(&self.lock);
        self.cond.notify_one();
    }

    fn raise_from_isr(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    /// Block until raised.  Returns `false` if `timeout` elapsed first.
    fn wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut guard = lock(&self.lock);
        loop {
            if self.pending.swap(0, Ordering::AcqRel) > 0 {
                return true;
            }
            let slice = match deadline {
                None => ISR_WAKE_POLL,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    (deadline - now).min(ISR_WAKE_POLL)
                }
            };
            guard = self
                .cond
                .wait_timeout(guard, slice)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

struct Shared {
    ready: AtomicBool,
    wake: WakeSignal,
    next_subscription: AtomicU32,
}

// ═══════════════════════════════════════════════════════════════
//  Queue storage
// ═══════════════════════════════════════════════════════════════

/// Producer/subscriber side of a queue, erased over capacity and slot count.
trait Channel<T>: Send + Sync {
    fn name(&self) -> &'static str;
    fn push(&self, item: T) -> core::result::Result<(), T>;
    fn insert(&self, handle: SubscriptionHandle, callback: Subscriber<T>) -> bool;
    fn remove(&self, handle: SubscriptionHandle) -> bool;
}

/// Consumer side of a queue, erased over the item type.
trait Drain: Send + Sync {
    fn name(&self) -> &'static str;
    fn drain(&self) -> usize;
}

struct EventQueue<T, const CAP: usize, const SLOTS: usize> {
    name: &'static str,
    items: MpMcQueue<T, CAP>,
    subscribers: Mutex<[Option<SubscriberSlot<T>>; SLOTS]>,
}

impl<T, const CAP: usize, const SLOTS: usize> EventQueue<T, CAP, SLOTS> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            items: MpMcQueue::new(),
            subscribers: Mutex::new(core::array::from_fn(|_| None)),
        }
    }
}

impl<T: Send, const CAP: usize, const SLOTS: usize> Channel<T> for EventQueue<T, CAP, SLOTS> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn push(&self, item: T) -> core::result::Result<(), T> {
        self.items.enqueue(item)
    }

    fn insert(&self, handle: SubscriptionHandle, callback: Subscriber<T>) -> bool {
        let mut slots = lock(&self.subscribers);
        for (i, slot) in slots.iter_mut().enumerate() {
            if slot.is_none() {
                debug!("Scheduler: '{}' subscriber at slot {}", self.name, i);
                *slot = Some(SubscriberSlot { handle, callback });
                return true;
            }
        }
        false
    }

    fn remove(&self, handle: SubscriptionHandle) -> bool {
        let mut slots = lock(&self.subscribers);
        for slot in slots.iter_mut() {
            if slot.as_ref().is_some_and(|s| s.handle == handle) {
                *slot = None;
                return true;
            }
        }
        false
    }
}

impl<T: Send, const CAP: usize, const SLOTS: usize> Drain for EventQueue<T, CAP, SLOTS> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn drain(&self) -> usize {
        let mut delivered = 0;
        while let Some(item) = self.items.dequeue() {
            // Snapshot so callbacks may (un)subscribe without deadlocking.
            let callbacks: heapless::Vec<Subscriber<T>, SLOTS> = lock(&self.subscribers)
                .iter()
                .flatten()
                .map(|s| Arc::clone(&s.callback))
                .collect();
            for callback in &callbacks {
                callback(&item);
            }
            delivered += 1;
        }
        delivered
    }
}

// ═══════════════════════════════════════════════════════════════
//  Producer handle
// ═══════════════════════════════════════════════════════════════

/// Producer and subscription handle for one declared queue.
///
/// Cheap to clone and safe to share between threads.
pub struct QueueHandle<T> {
    queue: Arc<dyn Channel<T>>,
    shared: Arc<Shared>,
}

impl<T> Clone for QueueHandle<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> QueueHandle<T> {
    pub fn name(&self) -> &'static str {
        self.queue.name()
    }

    /// Move `item` into the queue and wake the consumer.
    ///
    /// Returns `false` if the scheduler is not initialised yet or the queue
    /// is full.  Never blocks on the queue itself; safe from any task,
    /// including the consumer's own callbacks.
    pub fn enqueue(&self, item: T) -> bool {
        if !self.push(item) {
            return false;
        }
        self.shared.wake.raise();
        true
    }

    /// Interrupt-context variant of [`enqueue`](Self::enqueue): touches
    /// only atomics.  The consumer notices within a few milliseconds.
    pub fn enqueue_from_isr(&self, item: T) -> bool {
        if !self.push(item) {
            return false;
        }
        self.shared.wake.raise_from_isr();
        true
    }

    fn push(&self, item: T) -> bool {
        if !self.shared.ready.load(Ordering::Acquire) {
            return false;
        }
        self.queue.push(item).is_ok()
    }

    /// Install `callback` in the first free subscriber slot.
    ///
    /// Returns `None` when every slot is taken.
    pub fn subscribe(
        &self,
        callback: impl Fn(&T) + Send + Sync + 'static,
    ) -> Option<SubscriptionHandle> {
        let handle = SubscriptionHandle(self.shared.next_subscription.fetch_add(1, Ordering::Relaxed));
        if self.queue.insert(handle, Arc::new(callback)) {
            Some(handle)
        } else {
            warn!("Scheduler: '{}' subscriber table full", self.queue.name());
            None
        }
    }

    /// Remove the subscription identified by `handle`.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.queue.remove(handle)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler
// ═══════════════════════════════════════════════════════════════

/// Owner of the declared queues and the single consumer loop.
pub struct Scheduler {
    shared: Arc<Shared>,
    /// Declaration order is drain order.
    queues: heapless::Vec<Arc<dyn Drain>, MAX_QUEUES>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                ready: AtomicBool::new(false),
                wake: WakeSignal::new(),
                next_subscription: AtomicU32::new(1),
            }),
            queues: heapless::Vec::new(),
        }
    }

    /// Create the queue described by `descriptor` and return its handle.
    ///
    /// Only allowed before [`init`](Self::init).
    pub fn declare<T, const CAP: usize, const SLOTS: usize>(
        &mut self,
        descriptor: QueueDescriptor<T, CAP, SLOTS>,
    ) -> Result<QueueHandle<T>>
    where
        T: Send + 'static,
    {
        if self.is_ready() {
            warn!("Scheduler: '{}' declared after init", descriptor.name);
            return Err(Error::InvalidState);
        }
        let queue = Arc::new(EventQueue::<T, CAP, SLOTS>::new(descriptor.name));
        let drain: Arc<dyn Drain> = queue.clone();
        self.queues.push(drain).map_err(|_| Error::CollectionFull)?;
        info!(
            "Scheduler: declared '{}' (capacity {}, {} slots) at index {}",
            descriptor.name,
            descriptor.capacity(),
            descriptor.slots(),
            self.queues.len() - 1
        );
        Ok(QueueHandle {
            queue,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Freeze the queue table and accept items from now on.
    pub fn init(&mut self) {
        self.shared.ready.store(true, Ordering::Release);
        info!("Scheduler: ready with {} queues", self.queues.len());
    }

    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::Acquire)
    }

    /// Block until any enqueue succeeds, then drain every queue once.
    pub fn run(&self) {
        self.shared.wake.wait(None);
        self.drain_all();
    }

    /// [`run`](Self::run) with a bound on the wait.  Returns `false` if
    /// nothing woke the consumer within `timeout`.
    pub fn run_timeout(&self, timeout: Duration) -> bool {
        if !self.shared.wake.wait(Some(timeout)) {
            return false;
        }
        self.drain_all();
        true
    }

    fn drain_all(&self) -> usize {
        let mut total = 0;
        for queue in &self.queues {
            let n = queue.drain();
            if n > 0 {
                debug!("Scheduler: dispatched {} item(s) from '{}'", n, queue.name());
            }
            total += n;
        }
        total
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
