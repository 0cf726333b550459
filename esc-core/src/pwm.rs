//! ESC command signal on a hardware PWM channel

use crate::hal::CompareChannel;
use crate::types::PulseWidth;

/// Highest accepted throttle angle
pub const MAX_DEGREE: u8 = 179;

/// Linear map from `[0, 179]` degrees onto `[STOP, MAX]`, clamping the input
pub const fn degree_to_pulse(degree: u8) -> PulseWidth {
    let degree = if degree > MAX_DEGREE { MAX_DEGREE } else { degree };
    let span = (PulseWidth::MAX.as_micros() - PulseWidth::STOP.as_micros()) as u32;
    let offset = span * degree as u32 / MAX_DEGREE as u32;
    PulseWidth::from_micros(PulseWidth::STOP.as_micros() + offset as u16)
}

/// Pulse-width output driven by a free-running frame timer.
///
/// Writes land in the compare register and are picked up at the next frame
/// boundary by the hardware; nothing here blocks or validates.
pub struct PulseWidthOutput<P> {
    channel: P,
    ticks_per_us: u16,
}

impl<P> PulseWidthOutput<P>
where
    P: CompareChannel,
{
    pub const fn new(channel: P, ticks_per_us: u16) -> Self {
        Self { channel, ticks_per_us }
    }

    /// Program the active time of the next frame. Caller must pre-clamp.
    pub fn set_pulse_width(&mut self, width: PulseWidth) {
        let compare = width.as_micros().wrapping_mul(self.ticks_per_us);
        self.channel.set_compare(compare);
    }

    /// Last programmed pulse width
    pub fn pulse_width(&self) -> PulseWidth {
        PulseWidth::from_micros(self.channel.compare() / self.ticks_per_us)
    }

    /// Program a throttle angle, see [`degree_to_pulse`]
    pub fn set_degree(&mut self, degree: u8) {
        self.set_pulse_width(degree_to_pulse(degree));
    }

    pub fn channel(&self) -> &P {
        &self.channel
    }

    /// Consume the output and return the compare channel
    pub fn free(self) -> P {
        self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::MockPwm;

    #[test]
    fn test_degree_endpoints() {
        assert_eq!(degree_to_pulse(0), PulseWidth::STOP);
        assert_eq!(degree_to_pulse(179), PulseWidth::MAX);
        assert_eq!(degree_to_pulse(200), degree_to_pulse(179));
        assert_eq!(degree_to_pulse(255), PulseWidth::MAX);
    }

    #[test]
    fn test_degree_monotonic() {
        let mut previous = degree_to_pulse(0);
        for degree in 1..=MAX_DEGREE {
            let pulse = degree_to_pulse(degree);
            assert!(pulse >= previous);
            previous = pulse;
        }
    }

    #[test]
    fn test_degree_midpoint_truncates() {
        // 1000 + 1000 * 90 / 179 = 1502.79
        assert_eq!(degree_to_pulse(90).as_micros(), 1502);
    }

    #[test]
    fn test_set_then_get_roundtrip() {
        let mut out = PulseWidthOutput::new(MockPwm::new(), 2);
        for us in [1000u16, 1150, 1500, 1999, 2000] {
            out.set_pulse_width(PulseWidth::from_micros(us));
            assert_eq!(out.pulse_width().as_micros(), us);
        }
    }

    #[test]
    fn test_compare_is_scaled() {
        let mut out = PulseWidthOutput::new(MockPwm::new(), 2);
        out.set_pulse_width(PulseWidth::MED);
        assert_eq!(out.channel().compare(), 3000);
    }

    #[test]
    fn test_set_degree() {
        let mut out = PulseWidthOutput::new(MockPwm::new(), 1);
        out.set_degree(179);
        assert_eq!(out.pulse_width(), PulseWidth::MAX);
    }
}
