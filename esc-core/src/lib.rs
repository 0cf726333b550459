#![cfg_attr(not(any(feature = "std", test)), no_std)]

//! # ESC Core
//!
//! Brushless ESC throttle and tachometer logic for small microcontrollers.
//! A single pulse-width command drives the ESC through four button-selected
//! throttle levels, a one-edge-per-period sensor is timed into RPM, and a
//! startup sequence optionally teaches the ESC its end-of-range pulses.

pub mod types;
pub mod hal;
pub mod capture;
pub mod pwm;
pub mod fsm;
pub mod debounce;
pub mod calibration;
pub mod controller;
pub mod report;

#[cfg(feature = "test-utils")]
pub mod test_utils;


pub use types::*;
pub use capture::*;
pub use pwm::*;
pub use fsm::*;
pub use debounce::*;
pub use calibration::*;
pub use controller::*;
pub use report::*;
pub use hal::{
    check_factory_calibration, ButtonInput, CaptureTimer, CompareChannel, Duration, EscPlatform, HalError,
    StatusLed,
};

/// ESC core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Debouncer built from the configured settle and poll times
pub const fn default_debouncer(config: &EscConfig) -> Debouncer {
    Debouncer::new(config.debounce, config.release_poll)
}
