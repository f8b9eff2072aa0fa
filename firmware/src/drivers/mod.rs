//! Hardware drivers: actuator, display, input, and task helpers.

pub mod encoder;
pub mod heater_toggle;
pub mod hw_init;
pub mod lcd1602;
pub mod task_pin;
