//! CH32V003 register-level peripheral drivers
//!
//! Each type here is a zero-sized handle over a fixed peripheral and
//! implements one of the esc-core HAL traits. Setup runs once from `main`
//! before interrupts are enabled.

use embedded_hal::delay::DelayNs;
use esc_core::hal::{ButtonInput, CaptureTimer, CompareChannel, HalError, StatusLed};
use esc_core::EscConfig;

// ========================================
// Memory map
// ========================================

const RCC_BASE: u32 = 0x4002_1000;
const GPIOC_BASE: u32 = 0x4001_1000;
const GPIOD_BASE: u32 = 0x4001_1400;
const AFIO_BASE: u32 = 0x4001_0000;
const EXTI_BASE: u32 = 0x4001_0400;
const PFIC_BASE: u32 = 0xE000_E000;
const TIM1_BASE: u32 = 0x4001_2C00;
const TIM2_BASE: u32 = 0x4000_0000;
const USART1_BASE: u32 = 0x4001_3800;

/// RCC register offsets
const RCC_CTLR: u32 = 0x00;
const RCC_CFGR0: u32 = 0x04;
const RCC_APB2PCENR: u32 = 0x18;
const RCC_APB1PCENR: u32 = 0x1C;

/// GPIO register offsets
const GPIO_CFGLR: u32 = 0x00;
const GPIO_INDR: u32 = 0x08;
const GPIO_OUTDR: u32 = 0x0C;
const GPIO_BSHR: u32 = 0x10;

/// AFIO external interrupt port selection
const AFIO_EXTICR: u32 = 0x08;

/// EXTI register offsets
const EXTI_INTENR: u32 = 0x00;
const EXTI_FTENR: u32 = 0x0C;
const EXTI_INTFR: u32 = 0x14;

/// PFIC interrupt enable (set-only)
const PFIC_IENR1: u32 = 0x100;
const PFIC_IENR2: u32 = 0x104;

/// Timer register offsets
const TIM_CTLR1: u32 = 0x00;
const TIM_DMAINTENR: u32 = 0x0C;
const TIM_INTFR: u32 = 0x10;
const TIM_SWEVGR: u32 = 0x14;
const TIM_CHCTLR1: u32 = 0x18;
const TIM_CCER: u32 = 0x20;
const TIM_CNT: u32 = 0x24;
const TIM_PSC: u32 = 0x28;
const TIM_ATRLR: u32 = 0x2C;
const TIM_CH1CVR: u32 = 0x34;
const TIM_BDTR: u32 = 0x44;

/// USART register offsets
const USART_STATR: u32 = 0x00;
const USART_DATAR: u32 = 0x04;
const USART_BRR: u32 = 0x08;
const USART_CTLR1: u32 = 0x0C;

/// Interrupt numbers
const EXTI7_0_IRQN: u32 = 20;
const TIM2_IRQN: u32 = 38;

// ========================================
// Pin assignment
// ========================================

// PD2 = ESC signal (TIM1_CH1)
// PC1 = Button (active low, pull-up, EXTI1)
// PC2 = Rotor sensor (pull-up, falling edge, EXTI2)
// PD4 = Status LED (active high)
// PD5 = USART1 TX, PD6 = USART1 RX

pub const BUTTON_PIN: u8 = 1;
pub const SENSOR_PIN: u8 = 2;
const ESC_PWM_PIN: u8 = 2;
const LED_PIN: u8 = 4;
const UART_TX_PIN: u8 = 5;

/// EXTI line masks, one line per pin number
pub const BUTTON_LINE: u32 = 1 << BUTTON_PIN;
pub const SENSOR_LINE: u32 = 1 << SENSOR_PIN;

/// Core clock after `configure_clock`
pub const SYSCLK_HZ: u32 = 24_000_000;
/// TIM2 counts per update interrupt
pub const CAPTURE_TICKS_PER_OVERFLOW: u32 = 60_000;
const UART_BAUD: u32 = 9600;

#[inline(always)]
fn read(addr: u32) -> u32 {
    unsafe { core::ptr::read_volatile(addr as *const u32) }
}

#[inline(always)]
fn write(addr: u32, value: u32) {
    unsafe { core::ptr::write_volatile(addr as *mut u32, value) }
}

#[inline(always)]
fn modify(addr: u32, f: impl FnOnce(u32) -> u32) {
    write(addr, f(read(addr)));
}

/// Four-bit CFGLR field for one pin
fn configure_pin(port: u32, pin: u8, cfg: u32) {
    let shift = pin as u32 * 4;
    modify(port + GPIO_CFGLR, |v| (v & !(0xF << shift)) | (cfg << shift));
}

/// CNF=10 MODE=00
const PIN_INPUT_PULL: u32 = 0x8;
/// CNF=00 MODE=11
const PIN_OUTPUT_PUSH_PULL: u32 = 0x3;
/// CNF=10 MODE=11
const PIN_AF_PUSH_PULL: u32 = 0xB;

// ========================================
// Clock and calibration
// ========================================

/// Factory trim of the internal oscillator, RCC_CTLR[15:8]
pub fn read_hsi_calibration() -> u8 {
    ((read(RCC_BASE + RCC_CTLR) >> 8) & 0xFF) as u8
}

/// Run the core straight from the 24 MHz HSI with no AHB prescaler
pub fn configure_clock() {
    modify(RCC_BASE + RCC_CFGR0, |v| v & !(0xF << 4));
}

/// Enable clocks for every peripheral the controller touches
pub fn enable_peripheral_clocks() {
    // AFIO(0) GPIOC(4) GPIOD(5) TIM1(11) USART1(14)
    modify(RCC_BASE + RCC_APB2PCENR, |v| {
        v | (1 << 0) | (1 << 4) | (1 << 5) | (1 << 11) | (1 << 14)
    });
    // TIM2(0)
    modify(RCC_BASE + RCC_APB1PCENR, |v| v | 1);
}

/// Pin modes and pull-ups
pub fn configure_gpio_pins() {
    configure_pin(GPIOC_BASE, BUTTON_PIN, PIN_INPUT_PULL);
    configure_pin(GPIOC_BASE, SENSOR_PIN, PIN_INPUT_PULL);
    modify(GPIOC_BASE + GPIO_OUTDR, |v| v | BUTTON_LINE | SENSOR_LINE);

    configure_pin(GPIOD_BASE, ESC_PWM_PIN, PIN_AF_PUSH_PULL);
    configure_pin(GPIOD_BASE, LED_PIN, PIN_OUTPUT_PUSH_PULL);
    configure_pin(GPIOD_BASE, UART_TX_PIN, PIN_AF_PUSH_PULL);
    write(GPIOD_BASE + GPIO_BSHR, 1 << (LED_PIN + 16));
}

// ========================================
// ESC signal: TIM1 channel 1
// ========================================

/// Frame and compare resolution from `config`, output low until the first write
pub fn configure_pwm_timer(config: &EscConfig) {
    let timer_hz = config.compare_ticks_per_us as u32 * 1_000_000;
    write(TIM1_BASE + TIM_PSC, SYSCLK_HZ / timer_hz - 1);
    write(TIM1_BASE + TIM_ATRLR, config.frame_ticks() - 1);
    write(TIM1_BASE + TIM_CH1CVR, 0);
    // PWM mode 1, preload enable
    write(TIM1_BASE + TIM_CHCTLR1, (0x6 << 4) | (1 << 3));
    write(TIM1_BASE + TIM_CCER, 1);
    // Main output enable
    write(TIM1_BASE + TIM_BDTR, 1 << 15);
    // Load prescaler, then ARPE + CEN
    write(TIM1_BASE + TIM_SWEVGR, 1);
    write(TIM1_BASE + TIM_CTLR1, (1 << 7) | 1);
}

/// Compare register of TIM1 channel 1
pub struct Tim1Channel;

impl CompareChannel for Tim1Channel {
    fn set_compare(&mut self, value: u16) {
        write(TIM1_BASE + TIM_CH1CVR, value as u32);
    }

    fn compare(&self) -> u16 {
        read(TIM1_BASE + TIM_CH1CVR) as u16
    }
}

// ========================================
// Rotor period counter: TIM2
// ========================================

/// Free-running at the core clock, update interrupt every 2.5 ms
pub fn configure_capture_timer() {
    write(TIM2_BASE + TIM_PSC, 0);
    write(TIM2_BASE + TIM_ATRLR, CAPTURE_TICKS_PER_OVERFLOW - 1);
    write(TIM2_BASE + TIM_SWEVGR, 1);
    write(TIM2_BASE + TIM_INTFR, 0);
    write(TIM2_BASE + TIM_DMAINTENR, 1);
    write(TIM2_BASE + TIM_CTLR1, 1);
}

/// TIM2 counter and update flag
pub struct Tim2Capture;

impl Tim2Capture {
    /// Acknowledge an update interrupt; false if none was pending
    pub fn take_update(&mut self) -> bool {
        let pending = self.overflow_pending();
        if pending {
            write(TIM2_BASE + TIM_INTFR, !1);
        }
        pending
    }
}

impl CaptureTimer for Tim2Capture {
    fn count(&self) -> u16 {
        read(TIM2_BASE + TIM_CNT) as u16
    }

    fn overflow_pending(&self) -> bool {
        read(TIM2_BASE + TIM_INTFR) & 1 != 0
    }

    fn reset(&mut self) {
        write(TIM2_BASE + TIM_CNT, 0);
        write(TIM2_BASE + TIM_INTFR, !1);
    }
}

// ========================================
// External interrupts
// ========================================

/// Route PC1/PC2 to EXTI1/EXTI2 on falling edges; the sensor line is
/// unmasked immediately, the button line waits for `ExtiButton::enable_interrupt`
pub fn configure_exti_interrupts() {
    // Port C = 0b10 per two-bit field
    modify(AFIO_BASE + AFIO_EXTICR, |v| {
        let v = v & !((0b11 << (BUTTON_PIN * 2)) | (0b11 << (SENSOR_PIN * 2)));
        v | (0b10 << (BUTTON_PIN * 2)) | (0b10 << (SENSOR_PIN * 2))
    });
    modify(EXTI_BASE + EXTI_FTENR, |v| v | BUTTON_LINE | SENSOR_LINE);
    write(EXTI_BASE + EXTI_INTFR, BUTTON_LINE | SENSOR_LINE);
    modify(EXTI_BASE + EXTI_INTENR, |v| (v | SENSOR_LINE) & !BUTTON_LINE);
}

/// Unmask the EXTI7_0 and TIM2 vectors in the PFIC
pub fn enable_interrupt_vectors() {
    write(PFIC_BASE + PFIC_IENR1, 1 << EXTI7_0_IRQN);
    write(PFIC_BASE + PFIC_IENR2, 1 << (TIM2_IRQN - 32));
}

/// Pending EXTI lines
pub fn exti_pending() -> u32 {
    read(EXTI_BASE + EXTI_INTFR)
}

/// Clear pending EXTI lines (write one to clear)
pub fn exti_clear(lines: u32) {
    write(EXTI_BASE + EXTI_INTFR, lines);
}

/// Button on PC1 with its EXTI1 gate
pub struct ExtiButton;

impl ButtonInput for ExtiButton {
    type Error = HalError;

    fn is_pressed(&mut self) -> Result<bool, Self::Error> {
        Ok(read(GPIOC_BASE + GPIO_INDR) & BUTTON_LINE == 0)
    }

    fn enable_interrupt(&mut self) -> Result<(), Self::Error> {
        exti_clear(BUTTON_LINE);
        modify(EXTI_BASE + EXTI_INTENR, |v| v | BUTTON_LINE);
        Ok(())
    }

    fn disable_interrupt(&mut self) -> Result<(), Self::Error> {
        modify(EXTI_BASE + EXTI_INTENR, |v| v & !BUTTON_LINE);
        Ok(())
    }
}

// ========================================
// Status LED
// ========================================

/// Status LED on PD4
pub struct LedPin;

impl StatusLed for LedPin {
    type Error = HalError;

    fn set_state(&mut self, state: bool) -> Result<(), Self::Error> {
        let bit = if state { 1 << LED_PIN } else { 1 << (LED_PIN + 16) };
        write(GPIOD_BASE + GPIO_BSHR, bit);
        Ok(())
    }

    fn get_state(&self) -> Result<bool, Self::Error> {
        Ok(read(GPIOD_BASE + GPIO_OUTDR) & (1 << LED_PIN) != 0)
    }
}

// ========================================
// Telemetry UART
// ========================================

/// 8N1, transmit only
pub fn configure_uart() {
    write(USART1_BASE + USART_BRR, SYSCLK_HZ / UART_BAUD);
    // UE + TE
    write(USART1_BASE + USART_CTLR1, (1 << 13) | (1 << 3));
}

/// Blocking USART1 transmitter
pub struct Usart1Tx;

impl embedded_io::ErrorType for Usart1Tx {
    type Error = core::convert::Infallible;
}

impl embedded_io::Write for Usart1Tx {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        for &byte in buf {
            // TXE
            while read(USART1_BASE + USART_STATR) & (1 << 7) == 0 {}
            write(USART1_BASE + USART_DATAR, byte as u32);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        // TC
        while read(USART1_BASE + USART_STATR) & (1 << 6) == 0 {}
        Ok(())
    }
}

// ========================================
// Busy-wait delay
// ========================================

/// Cycle-counted delay at the core clock
pub struct CycleDelay;

impl DelayNs for CycleDelay {
    fn delay_ns(&mut self, ns: u32) {
        let cycles = ns as u64 * SYSCLK_HZ as u64 / 1_000_000_000;
        unsafe { riscv::asm::delay(cycles as u32) };
    }
}
