//! Deferred effectiveness checks observed through the engine.

use hydro_core::mocks::{ManualClock, ScriptedSensor, SpyPumps};
use hydro_core::{CycleOutcome, DosingConfig, EngineCfg, MemoryConfigStore, build_doser};
use hydro_traits::PumpRole;
use std::thread;
use std::time::Duration;

#[test]
fn under_delivering_dose_raises_the_advisory_factor() {
    let sensor = ScriptedSensor::new();
    let pumps = SpyPumps::new();
    let store = MemoryConfigStore::new(DosingConfig {
        enabled: true,
        ..DosingConfig::default()
    });
    let clock = ManualClock::new();
    let mut engine = build_doser(
        sensor.clone(),
        pumps.clone(),
        store,
        EngineCfg {
            startup_delay_ms: 0,
            // Fire the deferred check almost immediately in real time.
            effect_check_delay_ms: 1,
            ..EngineCfg::default()
        },
        None,
        Some(Box::new(clock.clone())),
    )
    .expect("build engine");

    // Dose fires on the low pH reading; the deferred re-read then sees a
    // barely moved value, so the dose under-delivered.
    sensor.push(5.5, 1.4);
    sensor.push(5.52, 1.4);
    clock.set_ms(1_000);
    assert!(matches!(engine.perform_cycle(), CycleOutcome::Dosed { .. }));

    for _ in 0..100 {
        if engine.status().pending_effect_checks == 0 {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(engine.status().pending_effect_checks, 0);

    let factor = engine.dose_factor(PumpRole::PhUp);
    assert!(factor > 1.0, "expected the factor to grow, got {factor}");

    // The learned factor scales the next base dose.
    clock.advance_ms(150_000);
    sensor.push(5.5, 1.4);
    match engine.perform_cycle() {
        CycleOutcome::Dosed { amount_ml, .. } => {
            assert!(amount_ml > 0.0);
        }
        other => panic!("expected Dosed, got {other:?}"),
    }
    let calls = pumps.calls();
    assert_eq!(calls.len(), 2);
    assert!(
        calls[1].volume_ml > calls[0].volume_ml,
        "second dose {} should exceed first {}",
        calls[1].volume_ml,
        calls[0].volume_ml
    );
}

#[test]
fn disabling_monitoring_cancels_pending_checks() {
    let sensor = ScriptedSensor::new();
    let store = MemoryConfigStore::new(DosingConfig {
        enabled: true,
        ..DosingConfig::default()
    });
    let clock = ManualClock::new();
    let mut engine = build_doser(
        sensor.clone(),
        SpyPumps::new(),
        store,
        EngineCfg {
            startup_delay_ms: 0,
            ..EngineCfg::default()
        },
        None,
        Some(Box::new(clock.clone())),
    )
    .expect("build engine");

    sensor.push(5.5, 1.4);
    clock.set_ms(1_000);
    assert!(matches!(engine.perform_cycle(), CycleOutcome::Dosed { .. }));
    assert_eq!(engine.status().pending_effect_checks, 1);

    engine.monitoring().disable();
    clock.advance_ms(1_000);
    assert!(matches!(
        engine.perform_cycle(),
        CycleOutcome::Aborted { .. }
    ));
    assert_eq!(engine.status().pending_effect_checks, 0);
}
