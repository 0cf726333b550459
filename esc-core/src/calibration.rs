//! One-shot startup calibration and run-enable handshake
//!
//! Holding the button at power-on puts the device in configuration mode:
//! the ESC sees full-range then zero-range pulses so it can learn its
//! end points. Either way, a final press arms the throttle button.

use crate::hal::{Duration, EscPlatform, HalError};
use crate::types::{CalibrationPhase, EscConfig, PulseWidth};

/// Poll interval while waiting on the button latch or level
const WAIT_POLL: Duration = Duration::from_millis(1);

/// Drives [`CalibrationPhase`] from `Idle` to `Armed`
#[derive(Debug)]
pub struct CalibrationSequence {
    phase: CalibrationPhase,
    config: EscConfig,
}

impl CalibrationSequence {
    pub const fn new(config: EscConfig) -> Self {
        Self {
            phase: CalibrationPhase::Idle,
            config,
        }
    }

    /// Get current phase
    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    /// Run every remaining phase to completion, blocking in between
    pub fn run<E: EscPlatform>(&mut self, platform: &mut E) -> Result<(), HalError> {
        while !self.phase.is_armed() {
            self.step(platform)?;
        }
        Ok(())
    }

    /// Execute the current phase and move to the next one
    pub fn step<E: EscPlatform>(&mut self, platform: &mut E) -> Result<CalibrationPhase, HalError> {
        let next = match self.phase {
            CalibrationPhase::Idle => {
                if platform.button_held()? {
                    CalibrationPhase::CalibratingMax
                } else {
                    platform.enable_button_interrupt()?;
                    self.run_enable_handshake(platform)?
                }
            }
            CalibrationPhase::CalibratingMax => self.calibrate_max(platform)?,
            CalibrationPhase::AwaitingAck => {
                wait_for_press(platform);
                platform.set_status_led(false)?;
                CalibrationPhase::CalibratingMin
            }
            CalibrationPhase::CalibratingMin => {
                platform.with_controller(|ctrl| ctrl.set_pulse_width(PulseWidth::STOP));
                platform.delay(self.config.min_settle);
                self.run_enable_handshake(platform)?
            }
            CalibrationPhase::Armed => CalibrationPhase::Armed,
        };

        #[cfg(feature = "defmt")]
        if next != self.phase {
            defmt::info!("Calibration: {:?} -> {:?}", self.phase, next);
        }

        self.phase = next;
        Ok(next)
    }

    /// High end-of-range pulse, configuration-mode blinks, then wait for release
    fn calibrate_max<E: EscPlatform>(&self, platform: &mut E) -> Result<CalibrationPhase, HalError> {
        platform.with_controller(|ctrl| ctrl.set_pulse_width(PulseWidth::MAX));

        for _ in 0..self.config.calibration_blinks {
            platform.set_status_led(true)?;
            platform.delay(self.config.calibration_blink_on);
            platform.set_status_led(false)?;
            platform.delay(self.config.calibration_blink_off);
        }

        while platform.button_held()? {
            platform.delay(WAIT_POLL);
        }
        platform.delay(self.config.release_settle);

        platform.enable_button_interrupt()?;
        platform.set_status_led(true)?;
        platform.with_controller(|ctrl| ctrl.clear_button_event());
        Ok(CalibrationPhase::AwaitingAck)
    }

    /// One press arms the controller
    fn run_enable_handshake<E: EscPlatform>(&self, platform: &mut E) -> Result<CalibrationPhase, HalError> {
        platform.set_status_led(true)?;
        platform.with_controller(|ctrl| ctrl.clear_button_event());
        wait_for_press(platform);
        platform.set_status_led(false)?;

        platform.with_controller(|ctrl| ctrl.arm());
        Ok(CalibrationPhase::Armed)
    }
}

/// Block until the button handler latches a qualifying press
fn wait_for_press<E: EscPlatform>(platform: &mut E) {
    while !platform.with_controller(|ctrl| ctrl.take_button_event()) {
        platform.delay(WAIT_POLL);
    }
}
