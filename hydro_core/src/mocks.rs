//! Test and helper mocks for hydro_core.
//!
//! Public (not `#[cfg(test)]`) so integration tests, the CLI's dry-run
//! paths, and downstream crates can drive the engine deterministically.

use hydro_traits::{Clock, PumpActuator, PumpRole, PumpStatus, SensorReading, SensorSource};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct Script {
    queue: VecDeque<SensorReading>,
    last: Option<SensorReading>,
    failing: bool,
}

/// Sensor fed by the test. Pops scripted readings in order, then repeats
/// the last one; clones share the script so a test can push mid-run.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSensor {
    inner: Arc<Mutex<Script>>,
}

impl ScriptedSensor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sensor that always reports the same pH/EC pair.
    pub fn constant(ph: f64, ec: f64) -> Self {
        let s = Self::new();
        s.push(ph, ec);
        s
    }

    pub fn push(&self, ph: f64, ec: f64) {
        self.push_reading(SensorReading {
            ph,
            ec,
            water_temp_c: 21.0,
            timestamp_ms: 0,
        });
    }

    pub fn push_reading(&self, reading: SensorReading) {
        lock(&self.inner).queue.push_back(reading);
    }

    /// While set, every read fails as if the probe went offline.
    pub fn set_failing(&self, failing: bool) {
        lock(&self.inner).failing = failing;
    }
}

impl SensorSource for ScriptedSensor {
    fn read(&mut self) -> Result<SensorReading, Box<dyn std::error::Error + Send + Sync>> {
        let mut s = lock(&self.inner);
        if s.failing {
            return Err("probe offline".into());
        }
        if let Some(r) = s.queue.pop_front() {
            s.last = Some(r);
            return Ok(r);
        }
        s.last.ok_or_else(|| "no scripted reading".into())
    }
}

/// One recorded actuation.
#[derive(Debug, Clone, Copy)]
pub struct DispenseCall {
    pub pump: PumpRole,
    pub volume_ml: f64,
    pub flow_rate_ml_s: f64,
}

/// Pump spy: records every dispense; can be told to fail a given pump.
/// Clones share the call log, so the test keeps a handle after moving one
/// copy into the engine.
#[derive(Debug, Clone, Default)]
pub struct SpyPumps {
    calls: Arc<Mutex<Vec<DispenseCall>>>,
    fail_on: Arc<Mutex<Option<PumpRole>>>,
}

impl SpyPumps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<DispenseCall> {
        lock(&self.calls).clone()
    }

    pub fn fail_on(&self, pump: Option<PumpRole>) {
        *lock(&self.fail_on) = pump;
    }
}

impl PumpActuator for SpyPumps {
    fn dispense(
        &mut self,
        pump: PumpRole,
        volume_ml: f64,
        flow_rate_ml_s: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if *lock(&self.fail_on) == Some(pump) {
            return Err("pump driver fault".into());
        }
        lock(&self.calls).push(DispenseCall {
            pump,
            volume_ml,
            flow_rate_ml_s,
        });
        Ok(())
    }

    fn status(&self, _pump: PumpRole) -> PumpStatus {
        PumpStatus { active: false }
    }
}

/// Deterministic clock advanced manually by the test.
///
/// now() = origin + offset; sleep(d) advances the offset without sleeping.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, d: Duration) {
        let mut off = lock(&self.offset);
        *off = off.saturating_add(d);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    /// Absolute offset from the origin; handy for jumping past windows.
    pub fn set_ms(&self, ms: u64) {
        *lock(&self.offset) = Duration::from_millis(ms);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *lock(&self.offset)
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}
