//! Core data types for the ESC controller

use crate::hal::Duration;

/// Throttle levels cycled by the button
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "std", derive(Hash))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ThrottleState {
    /// Motor stopped (end-of-range low pulse)
    Stop,
    /// Lowest spinning level
    Min,
    /// Midpoint between stop and full
    Med,
    /// Full throttle
    Max,
}

impl ThrottleState {
    /// Returns the next state in the cycle, wrapping after `Max`
    pub const fn next(&self) -> ThrottleState {
        match self {
            ThrottleState::Stop => ThrottleState::Min,
            ThrottleState::Min => ThrottleState::Med,
            ThrottleState::Med => ThrottleState::Max,
            ThrottleState::Max => ThrottleState::Stop,
        }
    }

    /// Fixed pulse width commanded for this state
    pub const fn pulse_width(&self) -> PulseWidth {
        match self {
            ThrottleState::Stop => PulseWidth::STOP,
            ThrottleState::Min => PulseWidth::MIN,
            ThrottleState::Med => PulseWidth::MED,
            ThrottleState::Max => PulseWidth::MAX,
        }
    }
}

/// Startup calibration phases
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationPhase {
    /// Power-on, button level not yet sampled
    Idle,
    /// Driving the high end-of-range pulse into the ESC
    CalibratingMax,
    /// Waiting for the user to acknowledge the ESC's high-range beeps
    AwaitingAck,
    /// Driving the low end-of-range pulse into the ESC
    CalibratingMin,
    /// Button now drives the throttle state machine
    Armed,
}

impl CalibrationPhase {
    /// Returns true once the run-enable handshake has completed
    pub const fn is_armed(&self) -> bool {
        matches!(self, CalibrationPhase::Armed)
    }
}

/// Active time of one PWM frame, in microseconds
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PulseWidth(u16);

impl PulseWidth {
    /// Output held low, no pulses. Power-on state before calibration or arming.
    pub const OFF: PulseWidth = PulseWidth(0);
    /// 1 ms, ESC stop / low end of range
    pub const STOP: PulseWidth = PulseWidth(1000);
    /// 1.15 ms
    pub const MIN: PulseWidth = PulseWidth(1150);
    /// 1.5 ms
    pub const MED: PulseWidth = PulseWidth((1000 + 2000) / 2);
    /// 2 ms, high end of range
    pub const MAX: PulseWidth = PulseWidth(2000);

    pub const fn from_micros(us: u16) -> Self {
        Self(us)
    }

    pub const fn as_micros(&self) -> u16 {
        self.0
    }
}

/// Coarse/fine counter pair captured at a sensor edge
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerState {
    /// Hardware counter value at the capture instant
    pub fine_count: u16,
    /// Overflow interrupts since the last capture
    pub coarse_ticks: u16,
}

impl TimerState {
    pub const fn new() -> Self {
        Self {
            fine_count: 0,
            coarse_ticks: 0,
        }
    }
}

/// One rotor period measured in fine counter ticks
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RotorPeriodSample {
    ticks: u64,
}

impl RotorPeriodSample {
    /// Combine a captured counter pair into total elapsed fine ticks
    pub const fn from_timer(state: TimerState, ticks_per_overflow: u32) -> Self {
        Self {
            ticks: state.fine_count as u64 + state.coarse_ticks as u64 * ticks_per_overflow as u64,
        }
    }

    pub const fn from_ticks(ticks: u64) -> Self {
        Self { ticks }
    }

    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Rotor speed, `round(60 / (elapsed * poles))`.
    ///
    /// Computed in integer fine-clock ticks: `60 * f / (ticks * poles)` with
    /// round-half-up. Returns `None` when the period is zero.
    pub fn rpm(&self, config: &EscConfig) -> Option<u32> {
        let denominator = self.ticks.checked_mul(config.pole_count as u64)?;
        if denominator == 0 {
            return None;
        }
        let numerator = config.rpm_numerator();
        let rpm = (2 * numerator + denominator) / (2 * denominator);
        Some(rpm.min(u32::MAX as u64) as u32)
    }
}

/// Compile-time ESC configuration
#[derive(Copy, Clone, Debug)]
pub struct EscConfig {
    /// Rate of the fine capture counter
    pub fine_clock_hz: u32,
    /// Fine ticks per coarse overflow interrupt
    pub ticks_per_overflow: u32,
    /// Sensor pulses per mechanical revolution
    pub pole_count: u8,
    /// PWM compare counts per microsecond of pulse width
    pub compare_ticks_per_us: u16,
    /// PWM frame period
    pub frame_us: u16,
    /// Settle time before and after waiting for button release
    pub debounce: Duration,
    /// Poll interval while spinning on the button level
    pub release_poll: Duration,
    /// LED on-time for each configuration-mode blink
    pub calibration_blink_on: Duration,
    /// LED off-time for each configuration-mode blink
    pub calibration_blink_off: Duration,
    /// Number of configuration-mode blinks
    pub calibration_blinks: u8,
    /// Wait after the button is released in configuration mode
    pub release_settle: Duration,
    /// Hold time of the low end-of-range pulse
    pub min_settle: Duration,
    /// Period of the telemetry line
    pub report_interval: Duration,
}

impl EscConfig {
    /// 16 MHz capture clock, 3.125 ms overflow, 7 poles, 2 MHz PWM timer
    pub const DEFAULT: EscConfig = EscConfig {
        fine_clock_hz: 16_000_000,
        ticks_per_overflow: 50_000,
        pole_count: 7,
        compare_ticks_per_us: 2,
        frame_us: 20_000,
        debounce: Duration::from_millis(10),
        release_poll: Duration::from_micros(100),
        calibration_blink_on: Duration::from_millis(50),
        calibration_blink_off: Duration::from_millis(250),
        calibration_blinks: 3,
        release_settle: Duration::from_millis(1000),
        min_settle: Duration::from_millis(2000),
        report_interval: Duration::from_millis(1000),
    };

    /// Create a configuration with custom timing bases, validated
    pub fn new(
        fine_clock_hz: u32,
        ticks_per_overflow: u32,
        pole_count: u8,
        compare_ticks_per_us: u16,
    ) -> Result<Self, &'static str> {
        let config = Self {
            fine_clock_hz,
            ticks_per_overflow,
            pole_count,
            compare_ticks_per_us,
            ..Self::DEFAULT
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that every timing base fits the hardware it is programmed into
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.fine_clock_hz == 0 {
            return Err("Capture clock must be non-zero");
        }
        if self.ticks_per_overflow == 0 || self.ticks_per_overflow > u16::MAX as u32 + 1 {
            return Err("Overflow period must fit the 16-bit counter");
        }
        if self.pole_count == 0 {
            return Err("Pole count must be positive");
        }
        if self.compare_ticks_per_us == 0
            || PulseWidth::MAX.as_micros() as u32 * self.compare_ticks_per_us as u32 > u16::MAX as u32
        {
            return Err("Compare resolution must fit the 16-bit compare register");
        }
        if self.frame_us <= PulseWidth::MAX.as_micros() || self.frame_ticks() > u16::MAX as u32 + 1 {
            return Err("Frame must outlast the longest pulse and fit the 16-bit reload");
        }
        Ok(())
    }

    /// PWM frame period in compare counts
    pub const fn frame_ticks(&self) -> u32 {
        self.frame_us as u32 * self.compare_ticks_per_us as u32
    }

    /// Length of one coarse tick in microseconds
    pub const fn coarse_tick_us(&self) -> u64 {
        self.ticks_per_overflow as u64 * 1_000_000 / self.fine_clock_hz as u64
    }

    /// `60 * f_fine`, the RPM numerator in fine ticks
    pub const fn rpm_numerator(&self) -> u64 {
        60 * self.fine_clock_hz as u64
    }
}

impl Default for EscConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
