//! Runtime configuration types for the dosing engine.
//!
//! These are the structs the engine works with each cycle. They are
//! separate from the TOML-deserialized schema in `hydro_config`; the
//! `conversions` module bridges the two.

use hydro_traits::PumpRole;

/// Target band for one controlled parameter.
#[derive(Debug, Clone, Copy)]
pub struct TargetBand {
    pub target: f64,
    pub tolerance: f64,
}

impl TargetBand {
    #[inline]
    pub fn low(&self) -> f64 {
        self.target - self.tolerance
    }

    #[inline]
    pub fn high(&self) -> f64 {
        self.target + self.tolerance
    }
}

/// Per-parameter targets.
#[derive(Debug, Clone, Copy)]
pub struct Targets {
    pub ph: TargetBand,
    pub ec: TargetBand,
}

impl Default for Targets {
    fn default() -> Self {
        Self {
            ph: TargetBand {
                target: 6.0,
                tolerance: 0.2,
            },
            ec: TargetBand {
                target: 1.4,
                tolerance: 0.2,
            },
        }
    }
}

/// PID gains for one pump's dose sizing. Compared for equality each cycle:
/// a change resets the controller state for that parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 0.5,
            ki: 0.05,
            kd: 0.1,
        }
    }
}

/// Settings for one metering pump.
#[derive(Debug, Clone, Copy)]
pub struct PumpSettings {
    /// Base dose in ml before PID scaling.
    pub dose_ml: f64,
    /// Dispense rate handed to the actuator.
    pub flow_rate_ml_s: f64,
    /// Minimum quiet time between doses from this pump.
    pub min_interval_ms: u64,
    /// Cumulative cap over the trailing 24 h window.
    pub daily_limit_ml: f64,
    /// Expected shift of the controlled parameter per ml dispensed; drives
    /// the deferred effectiveness check only.
    pub expected_shift_per_ml: f64,
    pub gains: PidGains,
}

impl Default for PumpSettings {
    fn default() -> Self {
        Self {
            dose_ml: 0.5,
            flow_rate_ml_s: 1.0,
            min_interval_ms: 120_000,
            daily_limit_ml: 50.0,
            expected_shift_per_ml: 0.1,
            gains: PidGains::default(),
        }
    }
}

/// The three pump channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct PumpTable {
    pub ph_up: PumpSettings,
    pub ph_down: PumpSettings,
    pub nutrient: PumpSettings,
}

impl PumpTable {
    pub fn by_role(&self, role: PumpRole) -> &PumpSettings {
        match role {
            PumpRole::PhUp => &self.ph_up,
            PumpRole::PhDown => &self.ph_down,
            PumpRole::Nutrient => &self.nutrient,
        }
    }
}

/// Circuit-breaker tuning plus the counters the engine writes back.
#[derive(Debug, Clone, Copy)]
pub struct ErrorCounters {
    pub threshold: u32,
    pub reset_ms: u64,
    pub fail_count: u32,
    pub last_failure_ms: Option<u64>,
}

impl Default for ErrorCounters {
    fn default() -> Self {
        Self {
            threshold: 10,
            reset_ms: 300_000,
            fail_count: 0,
            last_failure_ms: None,
        }
    }
}

/// Live configuration, snapshotted once at the start of each cycle.
#[derive(Debug, Clone, Default)]
pub struct DosingConfig {
    pub enabled: bool,
    pub targets: Targets,
    pub pumps: PumpTable,
    pub error_handling: ErrorCounters,
}

/// Engine timing knobs, fixed when the engine is built. Safety windows are
/// deliberately not live-tunable.
#[derive(Debug, Clone, Copy)]
pub struct EngineCfg {
    /// Cycles attempted closer together than this are refused.
    pub min_attempt_interval_ms: u64,
    /// Lock watchdog: a cycle holding the lock longer than this is
    /// force-released.
    pub max_lock_ms: u64,
    /// No dosing until this long after engine start.
    pub startup_delay_ms: u64,
    /// Delay before a dose's effect is re-measured.
    pub effect_check_delay_ms: u64,
}

impl Default for EngineCfg {
    fn default() -> Self {
        Self {
            min_attempt_interval_ms: 500,
            max_lock_ms: 30_000,
            startup_delay_ms: 30_000,
            effect_check_delay_ms: 300_000,
        }
    }
}
