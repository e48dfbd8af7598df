//! Hardware adapters for the dosing engine.
//!
//! Default build ships a coupled reservoir simulation: the simulated
//! sensor and pumps share one chemistry model, so dispensed volume
//! actually moves the readings and the control loop closes in software.
//! The `hardware` feature adds an I²C adapter for Atlas-style EZO probe
//! and pump boards on Linux.

pub mod error;
pub use error::HwError;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod ezo;

use hydro_traits::{PumpActuator, PumpRole, PumpStatus, SensorReading, SensorSource};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Per-ml effect of each pump on the simulated reservoir.
const SIM_PH_SHIFT_PER_ML: f64 = 0.08;
const SIM_EC_SHIFT_PER_ML: f64 = 0.05;
/// Drift applied on every read: reservoirs creep acidic and dilute.
const SIM_PH_DRIFT_PER_READ: f64 = 0.002;
const SIM_EC_DRIFT_PER_READ: f64 = 0.001;

#[derive(Debug)]
struct ReservoirModel {
    ph: f64,
    ec: f64,
    water_temp_c: f64,
    reads: u64,
}

fn lock_model(m: &Mutex<ReservoirModel>) -> MutexGuard<'_, ReservoirModel> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared simulation; hand its sensor and pumps to the engine and the
/// dispensed chemicals show up in subsequent readings.
#[derive(Debug, Clone)]
pub struct SimulatedReservoir {
    model: Arc<Mutex<ReservoirModel>>,
}

impl SimulatedReservoir {
    pub fn new(ph: f64, ec: f64) -> Self {
        Self {
            model: Arc::new(Mutex::new(ReservoirModel {
                ph,
                ec,
                water_temp_c: 21.5,
                reads: 0,
            })),
        }
    }

    pub fn sensor(&self) -> SimulatedSensor {
        SimulatedSensor {
            model: Arc::clone(&self.model),
        }
    }

    pub fn pumps(&self) -> SimulatedPumps {
        SimulatedPumps {
            model: Arc::clone(&self.model),
        }
    }

    /// Current simulated pH/EC (for assertions and CLI summaries).
    pub fn levels(&self) -> (f64, f64) {
        let m = lock_model(&self.model);
        (m.ph, m.ec)
    }
}

impl Default for SimulatedReservoir {
    fn default() -> Self {
        // Slightly acidic and under-fed, so a fresh simulation has
        // something for the engine to correct.
        Self::new(5.7, 1.1)
    }
}

/// Simulated probe bank reading the shared reservoir.
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    model: Arc<Mutex<ReservoirModel>>,
}

impl SensorSource for SimulatedSensor {
    fn read(&mut self) -> Result<SensorReading, Box<dyn std::error::Error + Send + Sync>> {
        let mut m = lock_model(&self.model);
        m.ph = (m.ph - SIM_PH_DRIFT_PER_READ).max(0.1);
        m.ec = (m.ec - SIM_EC_DRIFT_PER_READ).max(0.0);
        m.reads += 1;
        let reading = SensorReading {
            ph: m.ph,
            ec: m.ec,
            water_temp_c: m.water_temp_c,
            timestamp_ms: m.reads,
        };
        tracing::trace!(ph = reading.ph, ec = reading.ec, "simulated probe read");
        Ok(reading)
    }
}

/// Simulated pump bank acting on the shared reservoir.
#[derive(Debug, Clone)]
pub struct SimulatedPumps {
    model: Arc<Mutex<ReservoirModel>>,
}

impl PumpActuator for SimulatedPumps {
    fn dispense(
        &mut self,
        pump: PumpRole,
        volume_ml: f64,
        flow_rate_ml_s: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut m = lock_model(&self.model);
        match pump {
            PumpRole::PhUp => m.ph = (m.ph + volume_ml * SIM_PH_SHIFT_PER_ML).min(14.0),
            PumpRole::PhDown => m.ph = (m.ph - volume_ml * SIM_PH_SHIFT_PER_ML).max(0.0),
            PumpRole::Nutrient => m.ec = (m.ec + volume_ml * SIM_EC_SHIFT_PER_ML).min(5.0),
        }
        tracing::debug!(
            pump = pump.label(),
            volume_ml,
            flow_rate_ml_s,
            ph = m.ph,
            ec = m.ec,
            "simulated dispense"
        );
        Ok(())
    }

    fn status(&self, _pump: PumpRole) -> PumpStatus {
        // Simulated dispensing completes instantly.
        PumpStatus { active: false }
    }
}
