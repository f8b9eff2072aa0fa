//! One-shot GPIO interrupt setup for the rotary encoder.
//!
//! Configures the encoder lines as pulled-up inputs and installs the
//! per-pin ISR service using raw ESP-IDF sys calls.  Called once from
//! `main()` after the timer service is running, since every handler defers
//! its work through [`TimerService::soft_irq_from_isr`].

use std::sync::{Arc, OnceLock};

use crate::error::{Error, Result};
use crate::timer::TimerService;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;
#[cfg(target_os = "espidf")]
use log::{error, info};

#[cfg(target_os = "espidf")]
use crate::drivers::encoder;
#[cfg(target_os = "espidf")]
use crate::pins;

/// Timer service the ISRs defer into.  Set once, before interrupts are
/// enabled.
static ISR_TIMERS: OnceLock<Arc<TimerService>> = OnceLock::new();

#[cfg(target_os = "espidf")]
unsafe extern "C" fn quadrature_isr(_arg: *mut core::ffi::c_void) {
    let Some(timers) = ISR_TIMERS.get() else {
        return;
    };
    // SAFETY: gpio_get_level is a register read; safe in ISR context.
    let (a, b) = unsafe {
        (
            gpio_get_level(pins::ENCODER_A_GPIO) != 0,
            gpio_get_level(pins::ENCODER_B_GPIO) != 0,
        )
    };
    encoder::on_quadrature_edge(timers, a, b);
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn push_isr(_arg: *mut core::ffi::c_void) {
    if let Some(timers) = ISR_TIMERS.get() {
        encoder::on_push_edge(timers);
    }
}

#[cfg(target_os = "espidf")]
fn check(ret: esp_err_t, what: &str) -> Result<()> {
    if ret == ESP_OK as esp_err_t {
        Ok(())
    } else {
        error!("hw_init: {} failed (rc={})", what, ret);
        Err(Error::ResourceUnavailable)
    }
}

/// Configure the encoder inputs and route their edges to the decoder.
#[cfg(target_os = "espidf")]
pub fn init_encoder_interrupts(timers: Arc<TimerService>) -> Result<()> {
    ISR_TIMERS.set(timers).map_err(|_| Error::InvalidState)?;

    let mask = [pins::ENCODER_A_GPIO, pins::ENCODER_B_GPIO, pins::ENCODER_PUSH_GPIO]
        .iter()
        .fold(0u64, |mask, pin| mask | (1u64 << pin));
    let cfg = gpio_config_t {
        pin_bit_mask: mask,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        ..Default::default()
    };

    // SAFETY: called once from main() before the scheduler loop.  The
    // handlers are static functions that only touch the critical-section
    // decoder and the lock-free soft-IRQ ring.
    unsafe {
        check(gpio_config(&cfg), "encoder gpio_config")?;

        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK as esp_err_t && ret != ESP_ERR_INVALID_STATE as esp_err_t {
            return check(ret, "gpio_install_isr_service");
        }

        // Both quadrature lines: every edge.
        for pin in [pins::ENCODER_A_GPIO, pins::ENCODER_B_GPIO] {
            check(gpio_set_intr_type(pin, gpio_int_type_t_GPIO_INTR_ANYEDGE), "set_intr_type")?;
            check(
                gpio_isr_handler_add(pin, Some(quadrature_isr), core::ptr::null_mut()),
                "isr_handler_add",
            )?;
            check(gpio_intr_enable(pin), "intr_enable")?;
        }

        // Push switch: falling edge (active-low).
        check(
            gpio_set_intr_type(pins::ENCODER_PUSH_GPIO, gpio_int_type_t_GPIO_INTR_NEGEDGE),
            "set_intr_type",
        )?;
        check(
            gpio_isr_handler_add(pins::ENCODER_PUSH_GPIO, Some(push_isr), core::ptr::null_mut()),
            "isr_handler_add",
        )?;
        check(gpio_intr_enable(pins::ENCODER_PUSH_GPIO), "intr_enable")?;
    }

    info!("hw_init: encoder interrupts installed");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_encoder_interrupts(timers: Arc<TimerService>) -> Result<()> {
    ISR_TIMERS.set(timers).map_err(|_| Error::InvalidState)?;
    log::info!("hw_init(sim): encoder interrupts skipped");
    Ok(())
}
