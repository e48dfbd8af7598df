//! End-to-end cycle behavior against scripted collaborators.

use hydro_core::mocks::{ManualClock, ScriptedSensor, SpyPumps};
use hydro_core::{
    AutoDoserCore, ConfigStore, CycleError, CycleOutcome, DosingConfig, EngineCfg, IntervalHold,
    MemoryConfigStore, Parameter, RateHold, build_doser,
};
use hydro_traits::{PumpRole, SensorReading};

struct Rig {
    engine: AutoDoserCore<ScriptedSensor, SpyPumps, MemoryConfigStore>,
    sensor: ScriptedSensor,
    pumps: SpyPumps,
    store: MemoryConfigStore,
    clock: ManualClock,
}

/// Engine wired to shared-handle mocks; startup delay is zeroed unless the
/// test asks otherwise.
fn rig(config: DosingConfig, engine_cfg: EngineCfg) -> Rig {
    let sensor = ScriptedSensor::new();
    let pumps = SpyPumps::new();
    let store = MemoryConfigStore::new(config);
    let clock = ManualClock::new();
    let engine = build_doser(
        sensor.clone(),
        pumps.clone(),
        store.handle(),
        engine_cfg,
        None,
        Some(Box::new(clock.clone())),
    )
    .expect("build engine");
    Rig {
        engine,
        sensor,
        pumps,
        store,
        clock,
    }
}

fn no_startup() -> EngineCfg {
    EngineCfg {
        startup_delay_ms: 0,
        ..EngineCfg::default()
    }
}

fn enabled_config() -> DosingConfig {
    DosingConfig {
        enabled: true,
        ..DosingConfig::default()
    }
}

#[test]
fn low_ph_doses_ph_up_and_releases_lock() {
    // pH 5.5 against 6.0 +/- 0.2: below range.
    let r = rig(enabled_config(), no_startup());
    let mut engine = r.engine;
    r.sensor.push(5.5, 1.4);
    r.clock.set_ms(1_000);

    match engine.perform_cycle() {
        CycleOutcome::Dosed {
            pump,
            parameter,
            amount_ml,
            reading,
            ..
        } => {
            assert_eq!(pump, PumpRole::PhUp);
            assert_eq!(parameter, Parameter::Ph);
            assert!((reading - 5.5).abs() < 1e-9);
            assert!(amount_ml > 0.0);
        }
        other => panic!("expected Dosed, got {other:?}"),
    }

    let calls = r.pumps.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].pump, PumpRole::PhUp);
    assert!(!engine.status().cycle_in_flight, "lock must be released");
}

#[test]
fn high_ph_uses_the_lowering_pump() {
    let r = rig(enabled_config(), no_startup());
    let mut engine = r.engine;
    r.sensor.push(6.8, 1.4);
    r.clock.set_ms(1_000);

    match engine.perform_cycle() {
        CycleOutcome::Dosed { pump, .. } => assert_eq!(pump, PumpRole::PhDown),
        other => panic!("expected Dosed, got {other:?}"),
    }
}

#[test]
fn low_ec_feeds_nutrient_only_when_ph_in_range() {
    let r = rig(enabled_config(), no_startup());
    let mut engine = r.engine;
    r.sensor.push(6.0, 1.0);
    r.clock.set_ms(1_000);

    match engine.perform_cycle() {
        CycleOutcome::Dosed { pump, parameter, .. } => {
            assert_eq!(pump, PumpRole::Nutrient);
            assert_eq!(parameter, Parameter::Ec);
        }
        other => panic!("expected Dosed, got {other:?}"),
    }
}

#[test]
fn ph_takes_priority_over_ec() {
    // Both out of range: only the pH pump may fire this cycle.
    let r = rig(enabled_config(), no_startup());
    let mut engine = r.engine;
    r.sensor.push(5.5, 1.0);
    r.clock.set_ms(1_000);

    match engine.perform_cycle() {
        CycleOutcome::Dosed { pump, .. } => assert_eq!(pump, PumpRole::PhUp),
        other => panic!("expected Dosed, got {other:?}"),
    }
    assert_eq!(r.pumps.calls().len(), 1, "at most one dose per cycle");
}

#[test]
fn unusable_readings_fail_the_cycle_and_count_once() {
    let r = rig(enabled_config(), no_startup());
    let mut engine = r.engine;
    r.sensor.push_reading(SensorReading {
        ph: f64::NAN,
        ec: f64::NAN,
        water_temp_c: 21.0,
        timestamp_ms: 0,
    });
    r.clock.set_ms(1_000);

    match engine.perform_cycle() {
        CycleOutcome::Failed(CycleError::SensorUnavailable(detail)) => {
            assert!(detail.contains("pH") && detail.contains("EC"), "{detail}");
        }
        other => panic!("expected Failed, got {other:?}"),
    }
    assert_eq!(r.store.get().error_handling.fail_count, 1);
    assert!(!engine.status().cycle_in_flight);
    assert!(r.pumps.calls().is_empty());
}

#[test]
fn single_bad_reading_falls_back_instead_of_failing() {
    // pH bogus, EC valid and low: cycle proceeds on the fallback pH (6.0,
    // in range) and doses nutrients for the real EC reading.
    let r = rig(enabled_config(), no_startup());
    let mut engine = r.engine;
    r.sensor.push(99.0, 1.0);
    r.clock.set_ms(1_000);

    match engine.perform_cycle() {
        CycleOutcome::Dosed { pump, .. } => assert_eq!(pump, PumpRole::Nutrient),
        other => panic!("expected Dosed, got {other:?}"),
    }
    assert_eq!(r.store.get().error_handling.fail_count, 0);
}

#[test]
fn back_to_back_calls_hit_the_attempt_limiter() {
    // Default startup delay stands; jump past it first.
    let r = rig(enabled_config(), EngineCfg::default());
    let mut engine = r.engine;
    r.sensor.push(6.0, 1.4);
    r.clock.set_ms(35_000);

    assert!(matches!(engine.perform_cycle(), CycleOutcome::InRange));

    r.clock.advance_ms(100);
    match engine.perform_cycle() {
        CycleOutcome::WaitingRate(RateHold::AttemptInterval { remaining_ms }) => {
            assert_eq!(remaining_ms, 400);
        }
        other => panic!("expected WaitingRate, got {other:?}"),
    }
    assert!(r.pumps.calls().is_empty());
}

#[test]
fn startup_delay_blocks_early_cycles() {
    let r = rig(enabled_config(), EngineCfg::default());
    let mut engine = r.engine;
    r.sensor.push(5.0, 1.4);
    r.clock.set_ms(100);

    match engine.perform_cycle() {
        CycleOutcome::WaitingRate(RateHold::Startup { remaining_ms }) => {
            assert_eq!(remaining_ms, 29_900);
        }
        other => panic!("expected startup hold, got {other:?}"),
    }
    assert!(r.pumps.calls().is_empty());
}

#[test]
fn kill_switch_aborts_and_sticks() {
    let r = rig(enabled_config(), no_startup());
    let mut engine = r.engine;
    r.sensor.push(5.0, 1.4);
    r.clock.set_ms(1_000);

    engine.monitoring().disable();
    assert!(matches!(
        engine.perform_cycle(),
        CycleOutcome::Aborted { .. }
    ));

    r.clock.advance_ms(1_000);
    assert!(matches!(
        engine.perform_cycle(),
        CycleOutcome::Aborted { .. }
    ));
    assert!(r.pumps.calls().is_empty());

    // Re-enabled: dosing resumes.
    engine.monitoring().enable();
    r.clock.advance_ms(1_000);
    assert!(matches!(engine.perform_cycle(), CycleOutcome::Dosed { .. }));
}

#[test]
fn disabled_config_skips_without_touching_sensors() {
    let r = rig(DosingConfig::default(), no_startup());
    let mut engine = r.engine;
    // No scripted reading: a sensor read would fail the cycle instead.
    r.clock.set_ms(1_000);
    assert!(matches!(engine.perform_cycle(), CycleOutcome::Disabled));
    assert_eq!(r.store.get().error_handling.fail_count, 0);
}

#[test]
fn open_breaker_reports_reset_eta() {
    // Persisted counters at the threshold; last failure 1 s ago.
    let mut config = enabled_config();
    config.error_handling.fail_count = 10;
    config.error_handling.last_failure_ms = Some(60_000);
    let r = rig(config, no_startup());
    let mut engine = r.engine;
    r.sensor.push(5.0, 1.4);
    r.clock.set_ms(61_000);

    match engine.perform_cycle() {
        CycleOutcome::CircuitOpen { resets_at_ms } => {
            assert_eq!(resets_at_ms, 60_000 + 300_000);
        }
        other => panic!("expected CircuitOpen, got {other:?}"),
    }
    assert!(r.pumps.calls().is_empty());
}

#[test]
fn breaker_trips_after_threshold_failures_then_half_opens() {
    let mut config = enabled_config();
    config.error_handling.threshold = 2;
    config.error_handling.reset_ms = 10_000;
    let r = rig(config, no_startup());
    let mut engine = r.engine;
    r.sensor.set_failing(true);
    r.clock.set_ms(1_000);

    assert!(matches!(engine.perform_cycle(), CycleOutcome::Failed(_)));
    r.clock.advance_ms(1_000);
    assert!(matches!(engine.perform_cycle(), CycleOutcome::Failed(_)));
    assert_eq!(r.store.get().error_handling.fail_count, 2);

    r.clock.advance_ms(1_000);
    assert!(matches!(
        engine.perform_cycle(),
        CycleOutcome::CircuitOpen { .. }
    ));

    // Past the reset window the breaker half-opens; a healthy probe read
    // clears the streak.
    r.sensor.set_failing(false);
    r.sensor.push(6.0, 1.4);
    r.clock.advance_ms(10_000);
    assert!(matches!(engine.perform_cycle(), CycleOutcome::InRange));
    assert_eq!(r.store.get().error_handling.fail_count, 0);
}

#[test]
fn high_ec_warns_without_pumping_or_clearing_failures() {
    // EC 2.0 against 1.4 +/- 0.1: above range has no automatic remedy.
    let mut config = enabled_config();
    config.targets.ec.tolerance = 0.1;
    config.error_handling.fail_count = 2;
    let r = rig(config, no_startup());
    let mut engine = r.engine;
    r.sensor.push(6.0, 2.0);
    r.clock.set_ms(1_000);

    match engine.perform_cycle() {
        CycleOutcome::Warning {
            parameter, reading, ..
        } => {
            assert_eq!(parameter, Parameter::Ec);
            assert!((reading - 2.0).abs() < 1e-9);
        }
        other => panic!("expected Warning, got {other:?}"),
    }
    assert!(r.pumps.calls().is_empty());
    // Not a success: the failure streak must survive the warning.
    assert_eq!(r.store.get().error_handling.fail_count, 2);
}

#[test]
fn interval_gate_holds_a_repeat_dose() {
    let r = rig(enabled_config(), no_startup());
    let mut engine = r.engine;
    r.sensor.push(5.5, 1.4);
    r.clock.set_ms(1_000);
    assert!(matches!(engine.perform_cycle(), CycleOutcome::Dosed { .. }));

    // Still low, but inside the 120 s pump cooldown.
    r.clock.advance_ms(1_000);
    match engine.perform_cycle() {
        CycleOutcome::WaitingInterval {
            pump,
            hold: IntervalHold::MinInterval { remaining_ms },
        } => {
            assert_eq!(pump, PumpRole::PhUp);
            assert_eq!(remaining_ms, 119_000);
        }
        other => panic!("expected WaitingInterval, got {other:?}"),
    }
    assert_eq!(r.pumps.calls().len(), 1);
}

#[test]
fn daily_limit_holds_further_doses() {
    let mut config = enabled_config();
    config.pumps.ph_up.daily_limit_ml = 0.5;
    let r = rig(config, no_startup());
    let mut engine = r.engine;
    r.sensor.push(5.5, 1.4);
    r.clock.set_ms(1_000);
    assert!(matches!(engine.perform_cycle(), CycleOutcome::Dosed { .. }));

    // Past the cooldown, but the first dose already met the daily cap.
    r.clock.advance_ms(150_000);
    match engine.perform_cycle() {
        CycleOutcome::WaitingInterval {
            hold: IntervalHold::DailyLimit { dosed_ml, limit_ml },
            ..
        } => {
            assert!(dosed_ml >= limit_ml);
        }
        other => panic!("expected DailyLimit hold, got {other:?}"),
    }
}

#[test]
fn actuator_failure_is_pump_scoped_and_releases_lock() {
    let r = rig(enabled_config(), no_startup());
    let mut engine = r.engine;
    r.pumps.fail_on(Some(PumpRole::PhUp));
    r.sensor.push(5.5, 1.4);
    r.clock.set_ms(1_000);

    match engine.perform_cycle() {
        CycleOutcome::Failed(CycleError::Actuator { pump, .. }) => {
            assert_eq!(pump, PumpRole::PhUp);
        }
        other => panic!("expected actuator failure, got {other:?}"),
    }
    assert_eq!(r.store.get().error_handling.fail_count, 1);
    assert!(!engine.status().cycle_in_flight);

    // The next cycle proceeds normally once the pump recovers.
    r.pumps.fail_on(None);
    r.clock.advance_ms(1_000);
    assert!(matches!(engine.perform_cycle(), CycleOutcome::Dosed { .. }));
    assert_eq!(r.store.get().error_handling.fail_count, 0);
}

#[test]
fn every_terminal_outcome_leaves_the_lock_free() {
    let r = rig(enabled_config(), no_startup());
    let mut engine = r.engine;
    r.clock.set_ms(1_000);

    // error path (no reading scripted, sensor errors)
    assert!(matches!(engine.perform_cycle(), CycleOutcome::Failed(_)));
    assert!(!engine.status().cycle_in_flight);

    // dosed path
    r.sensor.push(5.5, 1.4);
    r.clock.advance_ms(1_000);
    assert!(matches!(engine.perform_cycle(), CycleOutcome::Dosed { .. }));
    assert!(!engine.status().cycle_in_flight);

    // in-range path
    r.sensor.push(6.0, 1.4);
    r.clock.advance_ms(1_000);
    assert!(matches!(engine.perform_cycle(), CycleOutcome::InRange));
    assert!(!engine.status().cycle_in_flight);

    // warning path
    r.sensor.push(6.0, 1.9);
    r.clock.advance_ms(1_000);
    assert!(matches!(engine.perform_cycle(), CycleOutcome::Warning { .. }));
    assert!(!engine.status().cycle_in_flight);
}

#[test]
fn status_snapshot_tracks_doses_and_breaker() {
    let r = rig(enabled_config(), no_startup());
    let mut engine = r.engine;
    r.sensor.push(5.5, 1.4);
    r.clock.set_ms(1_000);
    assert!(matches!(engine.perform_cycle(), CycleOutcome::Dosed { .. }));

    let status = engine.status();
    assert!(status.config_enabled);
    assert!(status.monitoring_enabled);
    assert!(!status.circuit_open);
    assert_eq!(status.fail_count, 0);
    assert_eq!(status.doses_last_24h, 1);
    let last = status.last_dose.expect("dose recorded");
    assert_eq!(last.pump, PumpRole::PhUp);
    assert_eq!(status.pending_effect_checks, 1);
}
