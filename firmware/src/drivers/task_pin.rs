//! Pinned thread spawning for firmware service tasks.
//!
//! Wraps `esp_pthread_set_cfg()` so that `std::thread` creates a FreeRTOS
//! task with explicit core, priority and stack size.  On non-ESP targets,
//! falls back to a plain named thread.
//!
//! # ESP-IDF Threading Model
//!
//! ESP-IDF implements `std::thread` via pthreads, which are thin wrappers
//! around FreeRTOS tasks. `esp_pthread_set_cfg()` sets thread-local
//! configuration that applies to the *next* `pthread_create()` call from
//! the calling thread, so the config→spawn pair must not be interleaved
//! with other thread creation on the same thread.

use std::thread::JoinHandle;

use crate::error::{Error, Result};

/// The ESP32-C3 has a single RISC-V core.
pub const CORE_MAIN: i32 = 0;

/// Scheduling parameters for one service task.
#[derive(Debug, Clone, Copy)]
pub struct TaskSpec {
    /// Null-terminated task name (e.g. `"timer-svc\0"`).
    pub name: &'static str,
    /// FreeRTOS priority; ignored on the host.
    pub priority: u8,
    pub stack_kb: usize,
}

impl TaskSpec {
    fn display_name(&self) -> &'static str {
        self.name.trim_end_matches('\0')
    }
}

/// Spawn `f` as a task configured by `spec`.
///
/// Fails with `ResourceUnavailable` if the RTOS refuses the configuration
/// or the thread cannot be created.
#[cfg(target_os = "espidf")]
pub fn spawn_task(spec: &TaskSpec, f: impl FnOnce() + Send + 'static) -> Result<JoinHandle<()>> {
    // SAFETY: the config struct is fully initialised by the IDF helper and
    // `name` is a 'static null-terminated string.
    let ret = unsafe {
        let mut cfg = esp_idf_svc::sys::esp_create_default_pthread_config();
        cfg.pin_to_core = CORE_MAIN;
        cfg.prio = i32::from(spec.priority);
        cfg.stack_size = (spec.stack_kb * 1024) as i32;
        cfg.thread_name = spec.name.as_ptr().cast();
        esp_idf_svc::sys::esp_pthread_set_cfg(&cfg)
    };
    if ret != esp_idf_svc::sys::ESP_OK as i32 {
        log::error!("task: esp_pthread_set_cfg failed for '{}' (rc={})", spec.display_name(), ret);
        return Err(Error::ResourceUnavailable);
    }

    log::info!(
        "Spawning '{}' (pri={}, stack={}KB)",
        spec.display_name(),
        spec.priority,
        spec.stack_kb
    );

    std::thread::Builder::new()
        .name(spec.display_name().into())
        .spawn(f)
        .map_err(|_| Error::ResourceUnavailable)
}

/// Simulation fallback: ignores priority and core affinity.
#[cfg(not(target_os = "espidf"))]
pub fn spawn_task(spec: &TaskSpec, f: impl FnOnce() + Send + 'static) -> Result<JoinHandle<()>> {
    log::info!(
        "Spawning '{}' (sim, stack={}KB)",
        spec.display_name(),
        spec.stack_kb
    );

    std::thread::Builder::new()
        .name(spec.display_name().into())
        .stack_size(spec.stack_kb * 1024)
        .spawn(f)
        .map_err(|_| Error::ResourceUnavailable)
}
