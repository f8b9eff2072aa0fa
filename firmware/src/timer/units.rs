//! Time unit conversions used by the timer service and the controller.

pub const fn ms_to_s(ms: u32) -> u32 {
    ms / 1000
}

pub const fn s_to_ms(s: u32) -> u32 {
    s.saturating_mul(1000)
}

pub const fn ms_to_us(ms: u32) -> u64 {
    ms as u64 * 1000
}

/// Truncates toward zero; saturates at `u32::MAX` milliseconds.
pub const fn us_to_ms(us: u64) -> u32 {
    let ms = us / 1000;
    if ms > u32::MAX as u64 { u32::MAX } else { ms as u32 }
}

/// Fractional seconds, for the feedback loop's time delta.
pub fn ms_to_secs_f32(ms: u32) -> f32 {
    ms as f32 / 1000.0
}
