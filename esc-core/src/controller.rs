//! Shared ESC state container and interrupt event entry points

use crate::capture::{CaptureOutcome, PeriodCapture, SharedRpm};
use crate::fsm::ThrottleStateMachine;
use crate::hal::{CaptureTimer, CompareChannel};
use crate::pwm::PulseWidthOutput;
use crate::types::{EscConfig, PulseWidth, ThrottleState};

/// Everything the interrupt handlers and the calibration touch.
///
/// Each `on_*` method is one interrupt handler body and runs to completion
/// before the next event is dispatched. Cross-context reads of the RPM go
/// through [`SharedRpm`] instead of this struct.
pub struct EscController<'a, P> {
    capture: PeriodCapture,
    output: PulseWidthOutput<P>,
    throttle: ThrottleStateMachine,
    armed: bool,
    button_event: bool,
    rpm: &'a SharedRpm,
}

impl<'a, P> EscController<'a, P>
where
    P: CompareChannel,
{
    /// Create the controller. The output starts at whatever the channel holds.
    pub const fn new(config: EscConfig, channel: P, rpm: &'a SharedRpm) -> Self {
        Self {
            capture: PeriodCapture::new(config),
            output: PulseWidthOutput::new(channel, config.compare_ticks_per_us),
            throttle: ThrottleStateMachine::new(),
            armed: false,
            button_event: false,
            rpm,
        }
    }

    /// Capture timer overflow handler
    pub fn on_overflow_tick(&mut self) {
        self.capture.on_overflow_tick();
    }

    /// Rotor sensor edge handler
    pub fn on_sensor_edge<T: CaptureTimer>(&mut self, timer: &mut T) -> CaptureOutcome {
        self.capture.on_sensor_edge(timer, self.rpm)
    }

    /// Qualifying (already debounced) button press.
    ///
    /// Latches the event for the calibration and, once armed, advances the
    /// throttle. Returns the new throttle state if it changed.
    pub fn on_button_edge(&mut self) -> Option<ThrottleState> {
        self.button_event = true;
        if self.armed {
            Some(self.throttle.advance(&mut self.output))
        } else {
            None
        }
    }

    /// Consume the latched button event
    pub fn take_button_event(&mut self) -> bool {
        core::mem::replace(&mut self.button_event, false)
    }

    /// Drop any latched button event
    pub fn clear_button_event(&mut self) {
        self.button_event = false;
    }

    /// Run-enable handshake completed: command STOP and hand the button to the throttle
    pub fn arm(&mut self) {
        if self.armed {
            return;
        }
        self.output.set_pulse_width(PulseWidth::STOP);
        self.throttle.reset();
        self.armed = true;

        #[cfg(feature = "defmt")]
        defmt::info!("Armed");
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn throttle_state(&self) -> ThrottleState {
        self.throttle.current_state()
    }

    /// Direct pulse-width write used by the calibration before arming
    pub fn set_pulse_width(&mut self, width: PulseWidth) {
        self.output.set_pulse_width(width);
    }

    pub fn pulse_width(&self) -> PulseWidth {
        self.output.pulse_width()
    }

    pub fn output(&self) -> &PulseWidthOutput<P> {
        &self.output
    }

    pub fn capture(&self) -> &PeriodCapture {
        &self.capture
    }

    pub fn shared_rpm(&self) -> &'a SharedRpm {
        self.rpm
    }
}
