//! End-to-end scenarios on the simulated board

use esc_core::test_utils::sim::{Script, SimEvent, Simulation, VecReporter};
use esc_core::*;

const CONFIG: EscConfig = EscConfig::DEFAULT;

fn compare_for(width: PulseWidth) -> u16 {
    width.as_micros() * CONFIG.compare_ticks_per_us
}

#[test]
fn test_normal_boot_single_press_arms() {
    let shared = SharedRpm::new();
    let script = Script::new().press(300_000, 40_000);
    let mut sim = Simulation::new(CONFIG, script, &shared);

    assert_eq!(sim.boot(), Ok(CalibrationPhase::Armed));

    let ctrl = sim.controller();
    assert!(ctrl.is_armed());
    assert_eq!(ctrl.pulse_width(), PulseWidth::STOP);
    assert_eq!(ctrl.throttle_state(), ThrottleState::Stop);
    assert_eq!(sim.led_flashes(), 1);
    assert!(!sim.led());

    // No pulses at all before the run-enable press
    let log = sim.compare_log();
    assert_eq!(log.len(), 1);
    assert!(log[0].0 >= 300_000);
    assert_eq!(log[0].1, compare_for(PulseWidth::STOP));
}

#[test]
fn test_configuration_mode_sequence() {
    let shared = SharedRpm::new();
    let script = Script::new()
        .hold_at_boot(500_000)
        .press(2_500_000, 50_000)
        .press(5_000_000, 50_000);
    let mut sim = Simulation::new(CONFIG, script, &shared);

    assert_eq!(sim.boot(), Ok(CalibrationPhase::Armed));

    let values: Vec<u16> = sim.compare_log().iter().map(|&(_, v)| v).collect();
    assert_eq!(
        values,
        vec![compare_for(PulseWidth::MAX), compare_for(PulseWidth::STOP), compare_for(PulseWidth::STOP)]
    );

    // MAX from power-on, STOP right after the acknowledge press
    let log = sim.compare_log();
    assert_eq!(log[0].0, 0);
    assert!(log[1].0 >= 2_500_000 && log[1].0 < 2_600_000);
    // low end point held for the full settle time before the handshake
    assert!(log[2].0 >= log[1].0 + 2_000_000);

    assert_eq!(sim.led_flashes(), 5);
    assert!(!sim.led());
    assert!(sim.controller().is_armed());
}

#[test]
fn test_presses_during_configuration_blinks_are_masked() {
    let shared = SharedRpm::new();
    let script = Script::new()
        .hold_at_boot(200_000)
        .press(400_000, 20_000)
        .press(2_500_000, 20_000)
        .press(5_000_000, 20_000);
    let mut sim = Simulation::new(CONFIG, script, &shared);

    sim.boot().unwrap();

    assert!(sim
        .events()
        .iter()
        .any(|e| matches!(e, SimEvent::ButtonMasked { at_us: 400_000 })));
    assert_eq!(sim.button_handler_runs(), 2);
    assert!(sim.throttle_changes().is_empty());
}

#[test]
fn test_bouncy_press_yields_one_advance() {
    let shared = SharedRpm::new();
    let script = Script::new()
        .press(5_000, 20_000)
        .bouncy_press(100_000, 30_000, &[300, 700, 1_500]);
    let mut sim = Simulation::new(CONFIG, script, &shared);

    sim.boot().unwrap();
    sim.run_for(Duration::from_millis(200));

    assert_eq!(sim.throttle_changes(), vec![ThrottleState::Min]);
    assert_eq!(sim.button_handler_runs(), 2);
    assert_eq!(sim.controller().pulse_width(), PulseWidth::MIN);
}

#[test]
fn test_four_presses_cycle_back_to_stop() {
    let shared = SharedRpm::new();
    let script = Script::new()
        .press(5_000, 20_000)
        .press(200_000, 20_000)
        .press(400_000, 20_000)
        .press(600_000, 20_000)
        .press(800_000, 20_000);
    let mut sim = Simulation::new(CONFIG, script, &shared);

    sim.boot().unwrap();
    sim.run_for(Duration::from_secs(1));

    assert_eq!(
        sim.throttle_changes(),
        vec![ThrottleState::Min, ThrottleState::Med, ThrottleState::Max, ThrottleState::Stop]
    );
    let values: Vec<u16> = sim.compare_log().iter().map(|&(_, v)| v).collect();
    assert_eq!(values, vec![2000, 2300, 3000, 4000, 2000]);
}

#[test]
fn test_long_hold_is_one_event() {
    let shared = SharedRpm::new();
    let script = Script::new().press(5_000, 20_000).press(100_000, 700_000);
    let mut sim = Simulation::new(CONFIG, script, &shared);

    sim.boot().unwrap();
    sim.run_for(Duration::from_secs(1));

    assert_eq!(sim.throttle_changes(), vec![ThrottleState::Min]);
}

#[test]
fn test_main_loop_reports_rotor_speed() {
    let shared = SharedRpm::new();
    let script = Script::new().rotor(10_000, 2_500_000, 4200, CONFIG.pole_count);
    let mut sim = Simulation::new(CONFIG, script, &shared);
    let mut reporter = VecReporter::default();

    sim.run_main_loop(4, &mut reporter).unwrap();

    // Unknown before the first full period, then held after the rotor stops
    assert_eq!(reporter.values, vec![0, 4200, 4200, 4200]);

    let first = sim
        .events()
        .iter()
        .find_map(|e| match e {
            SimEvent::Sensor { outcome, .. } => Some(*outcome),
            _ => None,
        })
        .unwrap();
    assert_eq!(first, CaptureOutcome::Discarded);
}

#[test]
fn test_sensor_edges_coalesce_while_handler_blocks() {
    let shared = SharedRpm::new();
    let script = Script::new()
        .press(5_000, 10_000)
        .press(100_000, 20_000)
        .rotor(10_000, 400_000, 4200, CONFIG.pole_count);
    let mut sim = Simulation::new(CONFIG, script, &shared);

    sim.boot().unwrap();
    sim.run_for(Duration::from_millis(500));

    let sensor_runs = sim
        .events()
        .iter()
        .filter(|e| matches!(e, SimEvent::Sensor { .. }))
        .count();
    let scripted = (400_000 - 10_000) / 2_041 + 1;
    assert!(sensor_runs < scripted, "{} of {} edges dispatched", sensor_runs, scripted);

    // Measurement recovers once the handler returns
    assert!(shared.load().unwrap().abs_diff(4200) <= 1);
}

#[test]
fn test_stall_keeps_last_value() {
    let shared = SharedRpm::new();
    let script = Script::new().rotor(0, 100_000, 3000, CONFIG.pole_count);
    let mut sim = Simulation::new(CONFIG, script, &shared);

    sim.run_for(Duration::from_secs(5));
    assert_eq!(shared.load(), Some(3000));
}

#[test]
#[should_panic(expected = "deadline")]
fn test_missing_press_hits_deadline() {
    let shared = SharedRpm::new();
    let mut sim = Simulation::new(CONFIG, Script::new(), &shared).with_deadline(2_000_000);
    let _ = sim.boot();
}
