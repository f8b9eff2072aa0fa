//! Unified error types for the ThermoPlate firmware.
//!
//! A single `Copy` enum that every subsystem returns, so the scheduler,
//! timer service and heat controller can pass failures across execution
//! contexts without allocation.  Initialisation failures are the only
//! fatal path and go through [`fatal`].

use core::fmt;
use core::panic::Location;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An argument was out of range or could not be decoded.
    InvalidInputParameter,
    /// Operation not allowed in the current state (wrong controller state,
    /// or incomplete constant-mode settings).
    InvalidState,
    /// No free subscriber, callback or queue slot.
    CollectionFull,
    /// Lock acquisition exceeded its bound.
    Timeout,
    /// Sensor bus transfer failed.
    CommunicationError,
    /// Sensor frame carried an error flag or was out of range.
    ConversionError,
    /// A peripheral or peer is not available right now.
    ResourceUnavailable,
    /// Unknown identifier, or removal of something never registered.
    UnknownResource,
    /// A heating profile ran to completion.  Not a failure.
    ExecutionStopped,
}

impl Error {
    /// `ExecutionStopped` signals normal termination; everything else is a
    /// real failure.
    pub const fn is_failure(self) -> bool {
        !matches!(self, Self::ExecutionStopped)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInputParameter => write!(f, "invalid input parameter"),
            Self::InvalidState => write!(f, "invalid state"),
            Self::CollectionFull => write!(f, "collection full"),
            Self::Timeout => write!(f, "timed out"),
            Self::CommunicationError => write!(f, "communication error"),
            Self::ConversionError => write!(f, "conversion error"),
            Self::ResourceUnavailable => write!(f, "resource unavailable"),
            Self::UnknownResource => write!(f, "unknown resource"),
            Self::ExecutionStopped => write!(f, "execution stopped"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Fatal handler
// ---------------------------------------------------------------------------

/// Log `context` with the caller's location and halt.
///
/// On ESP-IDF the calling task parks forever so the task watchdog can reset
/// the chip; on the host it panics so a harness sees the failure.
#[track_caller]
pub fn fatal(error: Error, context: &str) -> ! {
    let location = Location::caller();
    log::error!(
        "FATAL: {}: {} ({}:{})",
        context,
        error,
        location.file(),
        location.line()
    );

    #[cfg(target_os = "espidf")]
    loop {
        std::thread::park();
    }

    #[cfg(not(target_os = "espidf"))]
    panic!("fatal: {context}: {error}");
}

/// Route an initialisation `Result` into [`fatal`] on failure.
pub trait OrFatal<T> {
    fn or_fatal(self, context: &str) -> T;
}

impl<T> OrFatal<T> for Result<T> {
    #[track_caller]
    fn or_fatal(self, context: &str) -> T {
        match self {
            Ok(value) => value,
            Err(e) => fatal(e, context),
        }
    }
}
