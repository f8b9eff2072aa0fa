//! Sensor drivers.

pub mod thermocouple;

pub use thermocouple::Thermocouple;
