//! Rotor period capture and the shared RPM cell

use core::cell::Cell;
use critical_section::Mutex;

use crate::hal::CaptureTimer;
use crate::types::{EscConfig, RotorPeriodSample, TimerState};

/// Latest RPM, written by the capture handler and read by the main loop.
///
/// The value is wider than a single bus access on small cores, so both sides
/// go through a critical section and always see a whole value.
pub struct SharedRpm {
    value: Mutex<Cell<Option<u32>>>,
}

impl SharedRpm {
    pub const fn new() -> Self {
        Self {
            value: Mutex::new(Cell::new(None)),
        }
    }

    /// Overwrite the latest value (`None` = unknown)
    pub fn store(&self, rpm: Option<u32>) {
        critical_section::with(|cs| self.value.borrow(cs).set(rpm));
    }

    /// Snapshot of the latest value
    pub fn load(&self) -> Option<u32> {
        critical_section::with(|cs| self.value.borrow(cs).get())
    }

    /// Snapshot with unknown reported as zero
    pub fn load_or_zero(&self) -> u32 {
        self.load().unwrap_or(0)
    }
}

impl Default for SharedRpm {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one sensor edge
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CaptureOutcome {
    /// First edge after boot; counters only measured time since power-on
    Discarded,
    /// Edges closer together than the timer resolution
    Unknown,
    /// Valid measurement
    Measured(u32),
}

impl CaptureOutcome {
    pub const fn rpm(&self) -> Option<u32> {
        match self {
            CaptureOutcome::Measured(rpm) => Some(*rpm),
            CaptureOutcome::Discarded | CaptureOutcome::Unknown => None,
        }
    }
}

/// Coarse/fine period measurement between sensor edges
#[derive(Debug)]
pub struct PeriodCapture {
    timer: TimerState,
    primed: bool,
    config: EscConfig,
}

impl PeriodCapture {
    pub const fn new(config: EscConfig) -> Self {
        Self {
            timer: TimerState::new(),
            primed: false,
            config,
        }
    }

    /// Overflow interrupt: extend the counter range by one period
    pub fn on_overflow_tick(&mut self) {
        self.timer.coarse_ticks = self.timer.coarse_ticks.saturating_add(1);
    }

    /// Sensor edge interrupt. Must run with interrupts disabled.
    ///
    /// Reads the counter pair, restarts both counters and publishes the new
    /// RPM. The very first edge only starts the measurement.
    pub fn on_sensor_edge<T: CaptureTimer>(&mut self, timer: &mut T, shared: &SharedRpm) -> CaptureOutcome {
        // Count first: a wrap between the two reads then shows as a low
        // count with the flag set, which the fold below accounts for.
        let fine_count = timer.count();
        let pending = timer.overflow_pending();
        timer.reset();

        let mut captured = self.timer;
        captured.fine_count = fine_count;
        // A wrap that happened after interrupts were masked is still pending.
        // Low counts mean the counter already restarted past it.
        if pending && (fine_count as u32) < self.config.ticks_per_overflow / 2 {
            captured.coarse_ticks = captured.coarse_ticks.saturating_add(1);
        }
        self.timer = TimerState::new();

        if !self.primed {
            self.primed = true;
            #[cfg(feature = "defmt")]
            defmt::debug!("First sensor edge discarded");
            return CaptureOutcome::Discarded;
        }

        let sample = RotorPeriodSample::from_timer(captured, self.config.ticks_per_overflow);
        let outcome = match sample.rpm(&self.config) {
            Some(rpm) => CaptureOutcome::Measured(rpm),
            None => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Zero-length rotor period");
                CaptureOutcome::Unknown
            }
        };
        shared.store(outcome.rpm());
        outcome
    }

    /// Counter pair accumulated since the last edge
    pub fn timer_state(&self) -> TimerState {
        self.timer
    }

    /// True once a first edge has started the measurement
    pub fn is_primed(&self) -> bool {
        self.primed
    }
}
