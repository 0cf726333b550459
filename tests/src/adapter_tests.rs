//! embedded-hal adapter behaviour against mocked pins

use embedded_hal_mock::eh1::pin::{Mock as PinMock, State as PinState, Transaction as PinTransaction};
use embedded_hal_mock::eh1::pwm::{Mock as PwmMock, Transaction as PwmTransaction};
use esc_core::hal::{EmbeddedHalButton, EmbeddedHalLed, EmbeddedHalPwm};
use esc_core::*;

#[test]
fn test_button_is_active_low() {
    let expectations = [
        PinTransaction::get(PinState::High),
        PinTransaction::get(PinState::Low),
    ];
    let mut button = EmbeddedHalButton::new(PinMock::new(&expectations));

    assert_eq!(button.is_pressed(), Ok(false));
    assert_eq!(button.is_pressed(), Ok(true));

    button.enable_interrupt().unwrap();
    assert!(button.interrupt_enabled());
    button.disable_interrupt().unwrap();
    assert!(!button.interrupt_enabled());

    button.free().done();
}

#[test]
fn test_led_polarity() {
    let expectations = [
        PinTransaction::set(PinState::Low),
        PinTransaction::set(PinState::High),
    ];
    // Sinking LED: lit when the pin is low
    let mut led = EmbeddedHalLed::new(PinMock::new(&expectations), true);

    led.set_state(true).unwrap();
    assert_eq!(led.get_state(), Ok(true));
    led.toggle().unwrap();
    assert_eq!(led.get_state(), Ok(false));

    led.free().done();
}

#[test]
fn test_pwm_forwards_compare_values() {
    let expectations = [
        PwmTransaction::set_duty_cycle(2000),
        PwmTransaction::set_duty_cycle(4000),
    ];
    let mut output = PulseWidthOutput::new(EmbeddedHalPwm::new(PwmMock::new(&expectations)), 2);

    assert_eq!(output.pulse_width(), PulseWidth::OFF);
    output.set_pulse_width(PulseWidth::STOP);
    output.set_degree(179);
    assert_eq!(output.pulse_width(), PulseWidth::MAX);

    output.free().free().done();
}
