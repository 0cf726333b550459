#![no_std]
#![no_main]

// Logging support
#[cfg(feature = "defmt")]
use defmt::{info, warn};
#[cfg(feature = "defmt")]
use defmt_rtt as _;
use panic_halt as _;

// Define simple logging macros when defmt is not available
#[cfg(not(feature = "defmt"))]
macro_rules! info {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "defmt"))]
macro_rules! warn {
    ($($arg:tt)*) => {};
}

mod ch32v003_hardware;

use core::cell::RefCell;
use critical_section::Mutex;
use riscv_rt::entry;

use ch32v003_hardware::*;
use esc_core::hal::{delay_for, ButtonInput, StatusLed};
use esc_core::{
    check_factory_calibration, default_debouncer, report_once, CalibrationSequence, Duration, EscConfig,
    EscController, EscPlatform, HalError, SerialReporter, SharedRpm,
};

// Critical section implementation for RISC-V
struct RiscvCriticalSection;
critical_section::set_impl!(RiscvCriticalSection);

unsafe impl critical_section::Impl for RiscvCriticalSection {
    unsafe fn acquire() -> critical_section::RawRestoreState {
        let mstatus = riscv::register::mstatus::read();
        riscv::register::mstatus::clear_mie();
        mstatus.mie() as u8
    }

    unsafe fn release(was_enabled: critical_section::RawRestoreState) {
        if was_enabled != 0 {
            riscv::register::mstatus::set_mie();
        }
    }
}

/// Clock tree of this board: TIM2 at the core clock, TIM1 at 1 MHz
const CONFIG: EscConfig = EscConfig {
    fine_clock_hz: SYSCLK_HZ,
    ticks_per_overflow: CAPTURE_TICKS_PER_OVERFLOW,
    compare_ticks_per_us: 1,
    ..EscConfig::DEFAULT
};

// ========================================
// Global state
// ========================================

static RPM: SharedRpm = SharedRpm::new();
static CONTROLLER: Mutex<RefCell<EscController<'static, Tim1Channel>>> =
    Mutex::new(RefCell::new(EscController::new(CONFIG, Tim1Channel, &RPM)));

/// Thread-mode view of the board used by the startup calibration
struct Board {
    button: ExtiButton,
    led: LedPin,
    delay: CycleDelay,
}

impl EscPlatform for Board {
    type Output = Tim1Channel;

    fn with_controller<R>(&mut self, f: impl FnOnce(&mut EscController<'_, Tim1Channel>) -> R) -> R {
        critical_section::with(|cs| f(&mut CONTROLLER.borrow(cs).borrow_mut()))
    }

    fn button_held(&mut self) -> Result<bool, HalError> {
        self.button.is_pressed()
    }

    fn set_status_led(&mut self, on: bool) -> Result<(), HalError> {
        self.led.set_state(on)
    }

    fn enable_button_interrupt(&mut self) -> Result<(), HalError> {
        self.button.enable_interrupt()
    }

    fn delay(&mut self, duration: Duration) {
        delay_for(&mut self.delay, duration);
    }
}

/// Park the core; only an external reset leaves this
fn halt() -> ! {
    loop {
        unsafe { riscv::asm::wfi() };
    }
}

fn hardware_init() {
    configure_clock();
    enable_peripheral_clocks();
    configure_gpio_pins();
    configure_pwm_timer(&CONFIG);
    configure_capture_timer();
    configure_exti_interrupts();
    configure_uart();
    enable_interrupt_vectors();

    info!("Hardware initialization complete");
}

#[entry]
fn main() -> ! {
    if check_factory_calibration(read_hsi_calibration()).is_err() {
        halt();
    }
    if let Err(_reason) = CONFIG.validate() {
        warn!("Invalid configuration: {}", _reason);
        halt();
    }

    hardware_init();
    unsafe { riscv::register::mstatus::set_mie() };

    let mut board = Board {
        button: ExtiButton,
        led: LedPin,
        delay: CycleDelay,
    };
    let mut calibration = CalibrationSequence::new(CONFIG);
    if let Err(_e) = calibration.run(&mut board) {
        warn!("Calibration aborted: {:?}", _e);
        halt();
    }
    info!("Armed, reporting every {} ms", CONFIG.report_interval.as_millis());

    let mut reporter = SerialReporter::new(Usart1Tx);
    loop {
        if let Err(_e) = report_once(&RPM, &mut reporter) {
            warn!("Report failed: {:?}", _e);
        }
        delay_for(&mut board.delay, CONFIG.report_interval);
    }
}

// ========================================
// Interrupt Handlers
// ========================================

/// Sensor and button edges share the EXTI7_0 vector
#[no_mangle]
extern "C" fn EXTI7_0_IRQHandler() {
    let pending = exti_pending();

    if pending & SENSOR_LINE != 0 {
        exti_clear(SENSOR_LINE);
        critical_section::with(|cs| {
            CONTROLLER.borrow(cs).borrow_mut().on_sensor_edge(&mut Tim2Capture);
        });
    }

    if pending & BUTTON_LINE != 0 {
        exti_clear(BUTTON_LINE);
        let debouncer = default_debouncer(&CONFIG);
        let handled = debouncer.on_button_edge(&mut ExtiButton, &mut CycleDelay, || {
            critical_section::with(|cs| CONTROLLER.borrow(cs).borrow_mut().on_button_edge())
        });
        if let Err(_e) = handled {
            warn!("Button handler failed: {:?}", _e);
        }
    }
}

/// Coarse tick of the rotor period counter
#[no_mangle]
extern "C" fn TIM2_IRQHandler() {
    critical_section::with(|cs| {
        if Tim2Capture.take_update() {
            CONTROLLER.borrow(cs).borrow_mut().on_overflow_tick();
        }
    });
}
