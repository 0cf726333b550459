//! Hardware Abstraction Layer for the ESC controller

pub use embassy_time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::pwm::SetDutyCycle;

use crate::controller::EscController;

/// Error types for HAL operations
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HalError {
    /// GPIO operation failed
    GpioError,
    /// Factory oscillator calibration constant is erased
    MissingCalibration,
}

#[cfg(feature = "std")]
impl core::fmt::Display for HalError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HalError::GpioError => write!(f, "GPIO operation failed"),
            HalError::MissingCalibration => write!(f, "Factory clock calibration missing"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HalError {}

/// Validate the factory oscillator trim byte.
///
/// Erased flash reads back as `0xFF`; running on an untrimmed oscillator
/// would skew every pulse width and RPM figure, so boot must stop there.
pub fn check_factory_calibration(raw: u8) -> Result<u8, HalError> {
    if raw == 0xFF {
        Err(HalError::MissingCalibration)
    } else {
        Ok(raw)
    }
}

/// PWM compare register driving the ESC signal
pub trait CompareChannel {
    /// Program the active time of the next frame, in timer counts
    fn set_compare(&mut self, value: u16);

    /// Last programmed compare value
    fn compare(&self) -> u16;
}

/// Free-running counter used for rotor period measurement
pub trait CaptureTimer {
    /// Current fine counter value
    fn count(&self) -> u16;

    /// True if an overflow occurred that has not yet been serviced
    fn overflow_pending(&self) -> bool;

    /// Zero the counter and drop any pending overflow
    fn reset(&mut self);
}

/// Trait for the user button
pub trait ButtonInput {
    type Error: From<HalError>;

    /// Check if the button is currently held down
    fn is_pressed(&mut self) -> Result<bool, Self::Error>;

    /// Clear any latched edge and enable edge interrupts
    fn enable_interrupt(&mut self) -> Result<(), Self::Error>;

    /// Disable edge interrupts
    fn disable_interrupt(&mut self) -> Result<(), Self::Error>;
}

/// Trait for the status indicator
pub trait StatusLed {
    type Error: From<HalError>;

    /// Set indicator state (true = lit)
    fn set_state(&mut self, state: bool) -> Result<(), Self::Error>;

    /// Get current indicator state
    fn get_state(&self) -> Result<bool, Self::Error>;

    /// Toggle indicator state
    fn toggle(&mut self) -> Result<(), Self::Error> {
        let current = self.get_state()?;
        self.set_state(!current)
    }
}

/// Execution context of the startup calibration.
///
/// The calibration runs in thread mode while interrupt handlers own the
/// controller; every access to it goes through `with_controller`, which
/// must exclude those handlers for the duration of the closure.
pub trait EscPlatform {
    type Output: CompareChannel;

    /// Run `f` with exclusive access to the controller
    fn with_controller<R>(&mut self, f: impl FnOnce(&mut EscController<'_, Self::Output>) -> R) -> R;

    /// Raw button level, true while held
    fn button_held(&mut self) -> Result<bool, HalError>;

    /// Drive the status indicator
    fn set_status_led(&mut self, on: bool) -> Result<(), HalError>;

    /// Arm button edge detection
    fn enable_button_interrupt(&mut self) -> Result<(), HalError>;

    /// Block for `duration` while interrupts keep running
    fn delay(&mut self, duration: Duration);
}

/// Delay helper for embedded-hal delay providers
pub fn delay_for<D: DelayNs>(delay: &mut D, duration: Duration) {
    let us = duration.as_micros();
    delay.delay_us(us.min(u32::MAX as u64) as u32);
}

/// Generic implementation for embedded-hal compatible PWM channels
pub struct EmbeddedHalPwm<P> {
    pwm: P,
    last: u16,
}

impl<P> EmbeddedHalPwm<P>
where
    P: SetDutyCycle,
{
    pub fn new(pwm: P) -> Self {
        Self { pwm, last: 0 }
    }

    /// Consume the wrapper and return the underlying channel
    pub fn free(self) -> P {
        self.pwm
    }
}

impl<P> CompareChannel for EmbeddedHalPwm<P>
where
    P: SetDutyCycle,
{
    fn set_compare(&mut self, value: u16) {
        // Fire-and-forget register write; a HAL error leaves the previous frame running
        if self.pwm.set_duty_cycle(value).is_ok() {
            self.last = value;
        }
    }

    fn compare(&self) -> u16 {
        self.last
    }
}

/// Generic implementation for embedded-hal compatible button pins
pub struct EmbeddedHalButton<P> {
    pin: P,
    interrupt_enabled: bool,
}

impl<P> EmbeddedHalButton<P>
where
    P: InputPin,
{
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            interrupt_enabled: false,
        }
    }

    pub fn interrupt_enabled(&self) -> bool {
        self.interrupt_enabled
    }

    /// Consume the wrapper and return the underlying pin
    pub fn free(self) -> P {
        self.pin
    }
}

impl<P> ButtonInput for EmbeddedHalButton<P>
where
    P: InputPin,
{
    type Error = HalError;

    fn is_pressed(&mut self) -> Result<bool, Self::Error> {
        // Active low (pulled up, grounded when pressed)
        self.pin.is_low().map_err(|_| HalError::GpioError)
    }

    fn enable_interrupt(&mut self) -> Result<(), Self::Error> {
        // Edge routing is platform-specific; track the gate only
        self.interrupt_enabled = true;
        Ok(())
    }

    fn disable_interrupt(&mut self) -> Result<(), Self::Error> {
        self.interrupt_enabled = false;
        Ok(())
    }
}

/// Generic implementation for embedded-hal compatible LED pins
pub struct EmbeddedHalLed<P> {
    pin: P,
    state: bool,
    inverted: bool,
}

impl<P> EmbeddedHalLed<P>
where
    P: OutputPin,
{
    pub fn new(pin: P, inverted: bool) -> Self {
        Self {
            pin,
            state: false,
            inverted,
        }
    }

    pub fn free(self) -> P {
        self.pin
    }
}

impl<P> StatusLed for EmbeddedHalLed<P>
where
    P: OutputPin,
{
    type Error = HalError;

    fn set_state(&mut self, state: bool) -> Result<(), Self::Error> {
        let output_state = if self.inverted { !state } else { state };
        if output_state {
            self.pin.set_high().map_err(|_| HalError::GpioError)?;
        } else {
            self.pin.set_low().map_err(|_| HalError::GpioError)?;
        }
        self.state = state;
        Ok(())
    }

    fn get_state(&self) -> Result<bool, Self::Error> {
        Ok(self.state)
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    //! Mock implementations for testing

    use super::*;
    use core::cell::{Cell, RefCell};

    #[derive(Default)]
    pub struct MockPwm {
        compare: Cell<u16>,
        writes: RefCell<heapless::Vec<u16, 32>>,
    }

    impl MockPwm {
        pub fn new() -> Self {
            Self::default()
        }

        /// Compare values written so far, oldest first
        pub fn writes(&self) -> heapless::Vec<u16, 32> {
            self.writes.borrow().clone()
        }
    }

    impl CompareChannel for MockPwm {
        fn set_compare(&mut self, value: u16) {
            self.compare.set(value);
            self.writes.borrow_mut().push(value).ok();
        }

        fn compare(&self) -> u16 {
            self.compare.get()
        }
    }

    #[derive(Default)]
    pub struct MockCaptureTimer {
        count: Cell<u16>,
        pending: Cell<bool>,
        resets: Cell<u32>,
    }

    impl MockCaptureTimer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_count(&self, count: u16) {
            self.count.set(count);
        }

        pub fn set_overflow_pending(&self, pending: bool) {
            self.pending.set(pending);
        }

        pub fn resets(&self) -> u32 {
            self.resets.get()
        }
    }

    impl CaptureTimer for MockCaptureTimer {
        fn count(&self) -> u16 {
            self.count.get()
        }

        fn overflow_pending(&self) -> bool {
            self.pending.get()
        }

        fn reset(&mut self) {
            self.count.set(0);
            self.pending.set(false);
            self.resets.set(self.resets.get() + 1);
        }
    }

    #[derive(Default)]
    pub struct MockButton {
        pressed: Cell<bool>,
        interrupt_enabled: Cell<bool>,
        enable_calls: Cell<u32>,
    }

    impl MockButton {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_pressed(&self, pressed: bool) {
            self.pressed.set(pressed);
        }

        pub fn interrupt_enabled(&self) -> bool {
            self.interrupt_enabled.get()
        }

        pub fn enable_calls(&self) -> u32 {
            self.enable_calls.get()
        }
    }

    impl ButtonInput for MockButton {
        type Error = HalError;

        fn is_pressed(&mut self) -> Result<bool, Self::Error> {
            Ok(self.pressed.get())
        }

        fn enable_interrupt(&mut self) -> Result<(), Self::Error> {
            self.interrupt_enabled.set(true);
            self.enable_calls.set(self.enable_calls.get() + 1);
            Ok(())
        }

        fn disable_interrupt(&mut self) -> Result<(), Self::Error> {
            self.interrupt_enabled.set(false);
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MockLed {
        state: Cell<bool>,
    }

    impl MockLed {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn is_lit(&self) -> bool {
            self.state.get()
        }
    }

    impl StatusLed for MockLed {
        type Error = HalError;

        fn set_state(&mut self, state: bool) -> Result<(), Self::Error> {
            self.state.set(state);
            Ok(())
        }

        fn get_state(&self) -> Result<bool, Self::Error> {
            Ok(self.state.get())
        }
    }

    /// Delay that only accumulates the requested time
    #[derive(Default)]
    pub struct MockDelay {
        elapsed_ns: u64,
    }

    impl MockDelay {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn elapsed_us(&self) -> u64 {
            self.elapsed_ns / 1_000
        }
    }

    impl DelayNs for MockDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.elapsed_ns += ns as u64;
        }
    }
}
