//! Blocking button debounce

use embedded_hal::delay::DelayNs;

use crate::hal::{delay_for, ButtonInput, Duration};

/// Turns one physical press into exactly one action.
///
/// The handler masks further edges, runs the action, then blocks until the
/// contacts have settled and the button is back at its idle level. Every
/// other interrupt waits for this window; the PWM and capture timers keep
/// running in hardware.
#[derive(Copy, Clone, Debug)]
pub struct Debouncer {
    settle: Duration,
    poll: Duration,
}

impl Debouncer {
    pub const fn new(settle: Duration, poll: Duration) -> Self {
        Self { settle, poll }
    }

    /// Wrap a button edge. A stuck button blocks here until reset.
    pub fn on_button_edge<B, D, R>(
        &self,
        button: &mut B,
        delay: &mut D,
        action: impl FnOnce() -> R,
    ) -> Result<R, B::Error>
    where
        B: ButtonInput,
        D: DelayNs,
    {
        button.disable_interrupt()?;

        let result = action();

        delay_for(delay, self.settle);
        while button.is_pressed()? {
            delay_for(delay, self.poll);
        }
        delay_for(delay, self.settle);

        button.enable_interrupt()?;
        Ok(result)
    }

    pub fn settle(&self) -> Duration {
        self.settle
    }
}
