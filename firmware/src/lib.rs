//! ThermoPlate firmware library.
//!
//! Exposes the scheduler, timer service, heat controller and both control
//! surfaces for integration testing on the host.  All ESP-IDF-specific code
//! is guarded by `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod control;
pub mod drivers;
pub mod error;
pub mod events;
pub mod heater;
pub mod pins;
pub mod scheduler;
pub mod sensors;
pub mod timer;
