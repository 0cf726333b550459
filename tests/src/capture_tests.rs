//! RPM arithmetic and pulse-width mapping properties

use esc_core::hal::mock::{MockCaptureTimer, MockPwm};
use esc_core::test_utils::sim::{Script, Simulation};
use esc_core::*;
use proptest::prelude::*;
use rstest::rstest;

const CONFIG: EscConfig = EscConfig::DEFAULT;

/// Elapsed seconds for a counter pair at the default clock
fn elapsed_seconds(coarse: u16, fine: u16) -> f64 {
    fine as f64 * 62.5e-9 + coarse as f64 * 3.125e-3
}

#[rstest]
#[case::rpm_1000(2, 37_143, 1000)]
#[case::rpm_2000(1, 18_571, 2000)]
#[case::rpm_3000(0, 45_714, 3000)]
#[case::rpm_4200(0, 32_653, 4200)]
#[case::rpm_5000(0, 27_429, 5000)]
fn test_rpm_from_counter_pair(#[case] coarse: u16, #[case] fine: u16, #[case] expected: u32) {
    let sample = RotorPeriodSample::from_timer(TimerState { fine_count: fine, coarse_ticks: coarse }, CONFIG.ticks_per_overflow);
    assert_eq!(sample.rpm(&CONFIG), Some(expected));

    let reference = (60.0 / (elapsed_seconds(coarse, fine) * 7.0)).round() as u32;
    assert_eq!(reference, expected);
}

#[rstest]
#[case(2000)]
#[case(3000)]
#[case(4200)]
#[case(5000)]
fn test_simulated_rotor_reports_speed(#[case] rpm: u32) {
    let shared = SharedRpm::new();
    let script = Script::new().rotor(10_000, 500_000, rpm, CONFIG.pole_count);
    let mut sim = Simulation::new(CONFIG, script, &shared);

    sim.run_for(Duration::from_millis(600));

    let reported = shared.load().expect("rotor measured");
    assert!(reported.abs_diff(rpm) <= 1, "expected ~{} got {}", rpm, reported);
}

#[test]
fn test_zero_period_yields_unknown() {
    let shared = SharedRpm::new();
    let mut capture = PeriodCapture::new(CONFIG);
    let mut timer = MockCaptureTimer::new();

    capture.on_sensor_edge(&mut timer, &shared);
    timer.set_count(32_653);
    capture.on_sensor_edge(&mut timer, &shared);
    assert_eq!(shared.load(), Some(4200));

    assert_eq!(capture.on_sensor_edge(&mut timer, &shared), CaptureOutcome::Unknown);
    assert_eq!(shared.load_or_zero(), 0);
}

#[test]
fn test_boot_sample_never_reported() {
    let shared = SharedRpm::new();
    // Single edge two seconds after power-on
    let script = Script::new().sensor_edge(2_000_000);
    let mut sim = Simulation::new(CONFIG, script, &shared);

    sim.run_for(Duration::from_secs(3));
    assert_eq!(shared.load(), None);
    assert!(sim.controller().capture().is_primed());
}

proptest! {
    #[test]
    fn prop_rpm_matches_real_formula(ticks in 1u64..10_000_000) {
        let rpm = RotorPeriodSample::from_ticks(ticks).rpm(&CONFIG).unwrap();
        let exact = 60.0 * CONFIG.fine_clock_hz as f64 / (ticks as f64 * CONFIG.pole_count as f64);
        prop_assert!((rpm as f64 - exact).abs() <= 0.5 + 1e-6);
    }

    #[test]
    fn prop_rpm_non_increasing_in_period(ticks in 1u64..10_000_000, extra in 0u64..1_000) {
        let faster = RotorPeriodSample::from_ticks(ticks).rpm(&CONFIG).unwrap();
        let slower = RotorPeriodSample::from_ticks(ticks + extra).rpm(&CONFIG).unwrap();
        prop_assert!(slower <= faster);
    }

    #[test]
    fn prop_degree_to_pulse_monotonic(a in 0u8..=255, b in 0u8..=255) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(degree_to_pulse(lo) <= degree_to_pulse(hi));
        prop_assert!(degree_to_pulse(hi) <= PulseWidth::MAX);
        prop_assert!(degree_to_pulse(lo) >= PulseWidth::STOP);
    }

    #[test]
    fn prop_set_then_get_pulse_width(us in 1000u16..=2000) {
        let mut out = PulseWidthOutput::new(MockPwm::new(), CONFIG.compare_ticks_per_us);
        out.set_pulse_width(PulseWidth::from_micros(us));
        prop_assert_eq!(out.pulse_width().as_micros(), us);
    }
}

#[test]
fn test_set_then_get_mid_frame() {
    // The readback comes from the compare register, so frame phase is irrelevant
    let shared = SharedRpm::new();
    let script = Script::new().press(5_000, 20_000);
    let mut sim = Simulation::new(CONFIG, script, &shared);
    sim.boot().unwrap();

    for us in [1000u16, 1234, 1777, 2000] {
        sim.run_for(Duration::from_micros(7_321));
        esc_core::hal::EscPlatform::with_controller(&mut sim, |ctrl| {
            ctrl.set_pulse_width(PulseWidth::from_micros(us));
            assert_eq!(ctrl.pulse_width().as_micros(), us);
        });
    }
}
