//! Closed-loop control math.

pub mod pid;
pub mod power;

pub use power::PowerCalculator;
