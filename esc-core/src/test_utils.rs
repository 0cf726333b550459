//! Test utilities for ESC core functionality

#[cfg(feature = "test-utils")]
pub mod sim {
    //! Deterministic interrupt simulation on a virtual microsecond clock.
    //!
    //! Events (overflow ticks, sensor edges, button presses) are dispatched
    //! one at a time in timestamp order, each handler running to completion.
    //! While a handler blocks (debounce), time moves on without dispatching;
    //! overdue ticks and sensor edges then collapse into one pending flag,
    //! and button edges that arrived while detection was masked are dropped.

    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::vec::Vec;

    use embedded_hal::delay::DelayNs;

    use crate::calibration::CalibrationSequence;
    use crate::capture::{CaptureOutcome, SharedRpm};
    use crate::controller::EscController;
    use crate::debounce::Debouncer;
    use crate::hal::{ButtonInput, CaptureTimer, CompareChannel, Duration, EscPlatform, HalError};
    use crate::report::{report_once, RpmReporter};
    use crate::types::{CalibrationPhase, EscConfig, ThrottleState};

    /// Virtual time after which a simulation is considered hung
    pub const DEFAULT_DEADLINE_US: u64 = 120_000_000;

    /// Spacing between a bounce release and the following re-contact
    const BOUNCE_GAP_US: u64 = 200;

    /// Scripted stimulus for one simulation run
    #[derive(Clone, Debug, Default)]
    pub struct Script {
        held_at_boot: bool,
        button: Vec<(u64, bool)>,
        sensor: Vec<u64>,
    }

    impl Script {
        pub fn new() -> Self {
            Self::default()
        }

        /// Button held at power-on, released at `release_at_us`
        pub fn hold_at_boot(mut self, release_at_us: u64) -> Self {
            self.held_at_boot = true;
            self.button.push((release_at_us, false));
            self
        }

        /// Clean press at `at_us` held for `hold_us`
        pub fn press(mut self, at_us: u64, hold_us: u64) -> Self {
            self.button.push((at_us, true));
            self.button.push((at_us + hold_us, false));
            self
        }

        /// Press with contact bounce: a brief release at each offset
        pub fn bouncy_press(mut self, at_us: u64, hold_us: u64, bounces_us: &[u64]) -> Self {
            self.button.push((at_us, true));
            for &offset in bounces_us {
                self.button.push((at_us + offset, false));
                self.button.push((at_us + offset + BOUNCE_GAP_US, true));
            }
            self.button.push((at_us + hold_us, false));
            self
        }

        /// Rotor spinning at `rpm` between the two instants
        pub fn rotor(mut self, from_us: u64, until_us: u64, rpm: u32, pole_count: u8) -> Self {
            let interval = rotor_edge_interval_us(rpm, pole_count);
            let mut t = from_us;
            while t <= until_us {
                self.sensor.push(t);
                t += interval;
            }
            self
        }

        /// Single sensor edge
        pub fn sensor_edge(mut self, at_us: u64) -> Self {
            self.sensor.push(at_us);
            self
        }
    }

    /// Edge spacing of a rotor at `rpm`, rounded to the nearest microsecond
    pub fn rotor_edge_interval_us(rpm: u32, pole_count: u8) -> u64 {
        let per_minute = rpm as u64 * pole_count as u64;
        (60_000_000 + per_minute / 2) / per_minute
    }

    /// Shared simulated hardware
    #[derive(Debug)]
    pub struct SimBoard {
        now_us: u64,
        config: EscConfig,
        held_at_boot: bool,
        button_levels: Vec<(u64, bool)>,
        button_irq: bool,
        led: bool,
        led_log: Vec<(u64, bool)>,
        compare: u16,
        compare_log: Vec<(u64, u16)>,
        epoch_us: u64,
        next_tick_us: u64,
    }

    impl SimBoard {
        fn new(config: EscConfig, script: &Script) -> Self {
            let mut button_levels = script.button.clone();
            button_levels.sort_by_key(|(t, _)| *t);
            Self {
                now_us: 0,
                config,
                held_at_boot: script.held_at_boot,
                button_levels,
                button_irq: false,
                led: false,
                led_log: Vec::new(),
                compare: 0,
                compare_log: Vec::new(),
                epoch_us: 0,
                next_tick_us: config.coarse_tick_us(),
            }
        }

        fn button_level(&self) -> bool {
            self.button_levels
                .iter()
                .take_while(|(t, _)| *t <= self.now_us)
                .last()
                .map(|(_, level)| *level)
                .unwrap_or(self.held_at_boot)
        }

        fn press_edges(&self) -> VecDeque<u64> {
            let mut level = self.held_at_boot;
            let mut edges = VecDeque::new();
            for &(t, pressed) in &self.button_levels {
                if pressed && !level {
                    edges.push_back(t);
                }
                level = pressed;
            }
            edges
        }
    }

    type Board = Rc<RefCell<SimBoard>>;

    /// Compare register of the simulated frame timer
    pub struct SimPwm {
        board: Board,
    }

    impl CompareChannel for SimPwm {
        fn set_compare(&mut self, value: u16) {
            let mut board = self.board.borrow_mut();
            board.compare = value;
            let now = board.now_us;
            board.compare_log.push((now, value));
        }

        fn compare(&self) -> u16 {
            self.board.borrow().compare
        }
    }

    /// Free-running capture counter derived from the virtual clock
    pub struct SimTimer {
        board: Board,
    }

    impl CaptureTimer for SimTimer {
        fn count(&self) -> u16 {
            let board = self.board.borrow();
            let elapsed = board.now_us - board.epoch_us;
            let ticks = elapsed * board.config.fine_clock_hz as u64 / 1_000_000;
            (ticks % board.config.ticks_per_overflow as u64) as u16
        }

        fn overflow_pending(&self) -> bool {
            let board = self.board.borrow();
            board.next_tick_us <= board.now_us
        }

        fn reset(&mut self) {
            let mut board = self.board.borrow_mut();
            board.epoch_us = board.now_us;
            board.next_tick_us = board.now_us + board.config.coarse_tick_us();
        }
    }

    /// Button pin with scripted level
    pub struct SimButton {
        board: Board,
    }

    impl ButtonInput for SimButton {
        type Error = HalError;

        fn is_pressed(&mut self) -> Result<bool, Self::Error> {
            Ok(self.board.borrow().button_level())
        }

        fn enable_interrupt(&mut self) -> Result<(), Self::Error> {
            self.board.borrow_mut().button_irq = true;
            Ok(())
        }

        fn disable_interrupt(&mut self) -> Result<(), Self::Error> {
            self.board.borrow_mut().button_irq = false;
            Ok(())
        }
    }

    /// Busy-wait inside a handler: time passes, nothing is dispatched
    pub struct SimDelay {
        board: Board,
    }

    impl DelayNs for SimDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.board.borrow_mut().now_us += (ns as u64 + 999) / 1000;
        }
    }

    /// One dispatched interrupt
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum SimEvent {
        Tick { at_us: u64 },
        Sensor { at_us: u64, outcome: CaptureOutcome },
        Button { at_us: u64, throttle: Option<ThrottleState> },
        ButtonMasked { at_us: u64 },
    }

    #[derive(Copy, Clone)]
    enum Source {
        Tick,
        Sensor,
        Button,
    }

    /// Reporter collecting values in memory
    #[derive(Debug, Default)]
    pub struct VecReporter {
        pub values: Vec<u32>,
    }

    impl RpmReporter for VecReporter {
        fn report(&mut self, rpm: u32) -> Result<(), HalError> {
            self.values.push(rpm);
            Ok(())
        }
    }

    /// Controller wired to simulated hardware and an event dispatcher
    pub struct Simulation<'a> {
        board: Board,
        config: EscConfig,
        controller: EscController<'a, SimPwm>,
        debouncer: Debouncer,
        button: SimButton,
        delay: SimDelay,
        timer: SimTimer,
        sensor_edges: VecDeque<u64>,
        press_edges: VecDeque<u64>,
        events: Vec<SimEvent>,
        deadline_us: u64,
    }

    impl<'a> Simulation<'a> {
        pub fn new(config: EscConfig, script: Script, rpm: &'a SharedRpm) -> Self {
            let board = Rc::new(RefCell::new(SimBoard::new(config, &script)));
            let press_edges = board.borrow().press_edges();
            let mut sensor_edges: Vec<u64> = script.sensor;
            sensor_edges.sort_unstable();

            Self {
                controller: EscController::new(config, SimPwm { board: board.clone() }, rpm),
                debouncer: Debouncer::new(config.debounce, config.release_poll),
                button: SimButton { board: board.clone() },
                delay: SimDelay { board: board.clone() },
                timer: SimTimer { board: board.clone() },
                board,
                config,
                sensor_edges: sensor_edges.into(),
                press_edges,
                events: Vec::new(),
                deadline_us: DEFAULT_DEADLINE_US,
            }
        }

        pub fn with_deadline(mut self, deadline_us: u64) -> Self {
            self.deadline_us = deadline_us;
            self
        }

        /// Run the startup calibration to completion
        pub fn boot(&mut self) -> Result<CalibrationPhase, HalError> {
            let mut sequence = CalibrationSequence::new(self.config);
            sequence.run(self)?;
            Ok(sequence.phase())
        }

        /// Let interrupts run for `duration` of virtual time
        pub fn run_for(&mut self, duration: Duration) {
            let target = self.now_us() + duration.as_micros();
            self.advance_to(target);
        }

        /// Main loop: report, then sleep one interval, `iterations` times
        pub fn run_main_loop(&mut self, iterations: usize, reporter: &mut VecReporter) -> Result<(), HalError> {
            for _ in 0..iterations {
                report_once(self.controller.shared_rpm(), reporter)?;
                self.run_for(self.config.report_interval);
            }
            Ok(())
        }

        pub fn now_us(&self) -> u64 {
            self.board.borrow().now_us
        }

        pub fn controller(&self) -> &EscController<'a, SimPwm> {
            &self.controller
        }

        pub fn events(&self) -> &[SimEvent] {
            &self.events
        }

        /// Throttle changes caused by button handlers
        pub fn throttle_changes(&self) -> Vec<ThrottleState> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    SimEvent::Button { throttle, .. } => *throttle,
                    _ => None,
                })
                .collect()
        }

        /// Number of button handler invocations
        pub fn button_handler_runs(&self) -> usize {
            self.events
                .iter()
                .filter(|e| matches!(e, SimEvent::Button { .. }))
                .count()
        }

        /// Number of times the status LED was switched on
        pub fn led_flashes(&self) -> usize {
            self.board.borrow().led_log.iter().filter(|(_, on)| *on).count()
        }

        pub fn led(&self) -> bool {
            self.board.borrow().led
        }

        /// Every compare write with its timestamp
        pub fn compare_log(&self) -> Vec<(u64, u16)> {
            self.board.borrow().compare_log.clone()
        }

        fn next_source(&self) -> (u64, Source) {
            let mut next = (self.board.borrow().next_tick_us, Source::Tick);
            if let Some(&t) = self.sensor_edges.front() {
                if t < next.0 {
                    next = (t, Source::Sensor);
                }
            }
            if let Some(&t) = self.press_edges.front() {
                if t < next.0 {
                    next = (t, Source::Button);
                }
            }
            next
        }

        fn advance_to(&mut self, target_us: u64) {
            assert!(
                target_us <= self.deadline_us,
                "simulation deadline exceeded at {} us",
                target_us
            );

            loop {
                let (due, source) = self.next_source();
                if due > target_us {
                    let mut board = self.board.borrow_mut();
                    board.now_us = board.now_us.max(target_us);
                    return;
                }
                {
                    let mut board = self.board.borrow_mut();
                    board.now_us = board.now_us.max(due);
                }
                self.dispatch(source);
            }
        }

        fn dispatch(&mut self, source: Source) {
            let now = self.now_us();
            match source {
                Source::Tick => {
                    {
                        let mut board = self.board.borrow_mut();
                        let period = board.config.coarse_tick_us();
                        while board.next_tick_us <= now {
                            board.next_tick_us += period;
                        }
                    }
                    self.controller.on_overflow_tick();
                    self.events.push(SimEvent::Tick { at_us: now });
                }
                Source::Sensor => {
                    while self.sensor_edges.front().is_some_and(|&t| t <= now) {
                        self.sensor_edges.pop_front();
                    }
                    let outcome = self.controller.on_sensor_edge(&mut self.timer);
                    self.events.push(SimEvent::Sensor { at_us: now, outcome });
                }
                Source::Button => {
                    self.press_edges.pop_front();
                    if !self.board.borrow().button_irq {
                        self.events.push(SimEvent::ButtonMasked { at_us: now });
                        return;
                    }
                    let controller = &mut self.controller;
                    let throttle = self
                        .debouncer
                        .on_button_edge(&mut self.button, &mut self.delay, || controller.on_button_edge())
                        .unwrap_or(None);
                    self.events.push(SimEvent::Button { at_us: now, throttle });

                    // Edges latched while masked are cleared on re-enable
                    let after = self.now_us();
                    while self.press_edges.front().is_some_and(|&t| t < after) {
                        self.press_edges.pop_front();
                    }
                }
            }
        }
    }

    impl EscPlatform for Simulation<'_> {
        type Output = SimPwm;

        fn with_controller<R>(&mut self, f: impl FnOnce(&mut EscController<'_, SimPwm>) -> R) -> R {
            f(&mut self.controller)
        }

        fn button_held(&mut self) -> Result<bool, HalError> {
            Ok(self.board.borrow().button_level())
        }

        fn set_status_led(&mut self, on: bool) -> Result<(), HalError> {
            let mut board = self.board.borrow_mut();
            if board.led != on {
                let now = board.now_us;
                board.led_log.push((now, on));
            }
            board.led = on;
            Ok(())
        }

        fn enable_button_interrupt(&mut self) -> Result<(), HalError> {
            self.button.enable_interrupt()
        }

        fn delay(&mut self, duration: Duration) {
            self.run_for(duration);
        }
    }
}
