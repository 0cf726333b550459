//! Cyclic throttle state machine

use crate::hal::CompareChannel;
use crate::pwm::PulseWidthOutput;
use crate::types::ThrottleState;

/// STOP → MIN → MED → MAX → STOP, one step per qualifying button event
#[derive(Debug)]
pub struct ThrottleStateMachine {
    state: ThrottleState,
}

impl ThrottleStateMachine {
    pub const fn new() -> Self {
        Self {
            state: ThrottleState::Stop,
        }
    }

    /// Get current throttle state
    pub fn current_state(&self) -> ThrottleState {
        self.state
    }

    /// Advance one state and command its pulse width.
    ///
    /// Runs inside the button handler, so the state change and the compare
    /// write are never observed apart.
    pub fn advance<P: CompareChannel>(&mut self, output: &mut PulseWidthOutput<P>) -> ThrottleState {
        self.state = self.state.next();
        output.set_pulse_width(self.state.pulse_width());

        #[cfg(feature = "defmt")]
        defmt::info!("Throttle: {:?} ({} us)", self.state, self.state.pulse_width().as_micros());

        self.state
    }

    /// Reset to STOP without touching the output
    pub fn reset(&mut self) {
        self.state = ThrottleState::Stop;
    }
}

impl Default for ThrottleStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
