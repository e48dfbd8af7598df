//! Engine assembly and the cycle-driving commands.

use hydro_core::{
    AutoDoser, CycleOutcome, DosingConfig, EngineCfg, IntervalHold, MemoryConfigStore, RateHold,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
use hydro_hardware::SimulatedReservoir;

/// Engine plus the timing knobs the CLI needs for itself.
pub struct EngineHandles {
    pub doser: AutoDoser,
    pub engine_cfg: EngineCfg,
}

/// Wire sensors and pumps (real or simulated) into an engine.
pub fn assemble(config: &hydro_config::Config) -> eyre::Result<EngineHandles> {
    let store = MemoryConfigStore::new(DosingConfig::from(config));
    let engine_cfg = EngineCfg::from(&config.engine);

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    let doser = {
        let sensors = hydro_hardware::ezo::EzoSensors::new()
            .map_err(|e| eyre::eyre!("init probes: {e}"))?;
        let pumps =
            hydro_hardware::ezo::EzoPumps::new().map_err(|e| eyre::eyre!("init pumps: {e}"))?;
        AutoDoser::builder()
            .with_sensor(sensors)
            .with_pumps(pumps)
            .with_store(store.handle())
            .with_engine_cfg(engine_cfg)
            .build()?
    };

    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    let doser = {
        let reservoir = SimulatedReservoir::default();
        tracing::info!("no hardware feature; driving a simulated reservoir");
        AutoDoser::builder()
            .with_sensor(reservoir.sensor())
            .with_pumps(reservoir.pumps())
            .with_store(store.handle())
            .with_engine_cfg(engine_cfg)
            .build()?
    };

    Ok(EngineHandles { doser, engine_cfg })
}

/// Structured rendering of one cycle outcome.
pub fn outcome_json(outcome: &CycleOutcome) -> serde_json::Value {
    let details = match outcome {
        CycleOutcome::Aborted { reason } => json!({ "reason": reason }),
        CycleOutcome::CircuitOpen { resets_at_ms } => json!({ "resets_at_ms": resets_at_ms }),
        CycleOutcome::WaitingRate(RateHold::AttemptInterval { remaining_ms }) => {
            json!({ "reason": "attempt_interval", "remaining_ms": remaining_ms })
        }
        CycleOutcome::WaitingRate(RateHold::Startup { remaining_ms }) => {
            json!({ "reason": "startup", "remaining_ms": remaining_ms })
        }
        CycleOutcome::WaitingInterval { pump, hold } => match hold {
            IntervalHold::MinInterval { remaining_ms } => {
                json!({ "pump": pump.label(), "reason": "min_interval", "remaining_ms": remaining_ms })
            }
            IntervalHold::DailyLimit { dosed_ml, limit_ml } => {
                json!({ "pump": pump.label(), "reason": "daily_limit", "dosed_ml": dosed_ml, "limit_ml": limit_ml })
            }
        },
        CycleOutcome::Dosed {
            pump,
            parameter,
            amount_ml,
            reading,
            target,
        } => json!({
            "pump": pump.label(),
            "parameter": parameter.label(),
            "amount_ml": amount_ml,
            "reading": reading,
            "target": target,
        }),
        CycleOutcome::Warning {
            parameter,
            reading,
            target,
        } => json!({
            "parameter": parameter.label(),
            "reading": reading,
            "target": target,
            "note": "above range; dilution required",
        }),
        CycleOutcome::Failed(err) => json!({ "error": err.to_string() }),
        CycleOutcome::Disabled
        | CycleOutcome::WaitingLock
        | CycleOutcome::InRange => json!({}),
    };
    json!({ "action": outcome.action_name(), "details": details })
}

fn emit(outcome: &CycleOutcome, json_mode: bool) {
    if json_mode {
        println!("{}", outcome_json(outcome));
    } else {
        println!("cycle: {}", outcome.action_name());
    }
}

/// One-shot evaluation. Returns the process exit code.
pub fn run_once(config: &hydro_config::Config, wait_startup: bool, json_mode: bool) -> eyre::Result<i32> {
    let mut handles = assemble(config)?;
    if wait_startup {
        let delay = handles.engine_cfg.startup_delay_ms;
        tracing::info!(delay_ms = delay, "waiting out the startup safety delay");
        thread::sleep(Duration::from_millis(delay.saturating_add(5)));
    }
    let outcome = handles.doser.perform_cycle();
    emit(&outcome, json_mode);
    Ok(match outcome {
        CycleOutcome::Failed(_) => 3,
        _ => 0,
    })
}

/// Periodic cycles until ctrl-c (or `max_cycles`). Returns the exit code.
pub fn run_loop(
    config: &hydro_config::Config,
    period_secs: u64,
    max_cycles: u64,
    json_mode: bool,
) -> eyre::Result<i32> {
    let mut handles = assemble(config)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::Relaxed);
        })?;
    }

    let period = Duration::from_secs(period_secs.max(1));
    tracing::info!(period_secs = period.as_secs(), "dosing loop started");

    let mut completed = 0u64;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!("shutdown requested; leaving dosing loop");
            break;
        }

        let outcome = handles.doser.perform_cycle();
        emit(&outcome, json_mode);
        completed += 1;
        if max_cycles > 0 && completed >= max_cycles {
            break;
        }

        // Sleep in small slices so ctrl-c is honored promptly.
        let mut remaining = period;
        while !remaining.is_zero() && !shutdown.load(Ordering::Relaxed) {
            let slice = remaining.min(Duration::from_millis(200));
            thread::sleep(slice);
            remaining -= slice;
        }
    }

    let status = handles.doser.status();
    tracing::info!(
        cycles = completed,
        doses_last_24h = status.doses_last_24h,
        fail_count = status.fail_count,
        "dosing loop finished"
    );
    Ok(0)
}

/// Collaborator health probe. Returns the process exit code.
pub fn check(config: &hydro_config::Config, json_mode: bool) -> eyre::Result<i32> {
    use hydro_traits::{PumpActuator, PumpRole, SensorSource};

    let _ = config;

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    let (mut sensor, pumps) = {
        let sensor = hydro_hardware::ezo::EzoSensors::new()
            .map_err(|e| eyre::eyre!("init probes: {e}"))?;
        let pumps =
            hydro_hardware::ezo::EzoPumps::new().map_err(|e| eyre::eyre!("init pumps: {e}"))?;
        (sensor, pumps)
    };

    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    let (mut sensor, pumps) = {
        let reservoir = SimulatedReservoir::default();
        (reservoir.sensor(), reservoir.pumps())
    };

    match sensor.read() {
        Ok(reading) => {
            let pump_states: serde_json::Value = PumpRole::ALL
                .iter()
                .map(|&role| (role.label().to_string(), json!({ "active": pumps.status(role).active })))
                .collect::<serde_json::Map<_, _>>()
                .into();
            if json_mode {
                println!(
                    "{}",
                    json!({
                        "ok": true,
                        "ph": reading.ph,
                        "ec": reading.ec,
                        "water_temp_c": reading.water_temp_c,
                        "pumps": pump_states,
                    })
                );
            } else {
                println!(
                    "sensor ok: pH {:.2}, EC {:.2} mS/cm, water {:.1} C",
                    reading.ph, reading.ec, reading.water_temp_c
                );
            }
            Ok(0)
        }
        Err(e) => {
            if json_mode {
                println!("{}", json!({ "ok": false, "error": e.to_string() }));
            } else {
                println!("sensor unavailable: {e}");
            }
            Ok(4)
        }
    }
}
