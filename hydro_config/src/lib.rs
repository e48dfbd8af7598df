#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the reservoir dosing system.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The error-handling counters (`fail_count`, `last_failure_ms`) are
//!   persisted state, not tuning: the engine writes them back through its
//!   config store so a restart resumes with the breaker history intact.

use serde::Deserialize;

/// Target band for one controlled parameter.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct TargetBand {
    pub target: f64,
    /// Acceptable deviation either side of `target` before dosing triggers.
    pub tolerance: f64,
}

/// Per-parameter targets.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
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

/// PID gains for one pump's dose sizing.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Gains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for Gains {
    fn default() -> Self {
        Self {
            kp: 0.5,
            ki: 0.05,
            kd: 0.1,
        }
    }
}

/// Settings for one metering pump.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct PumpCfg {
    /// Base dose in ml before PID scaling.
    pub dose_ml: f64,
    /// Dispense rate handed to the actuator.
    pub flow_rate_ml_s: f64,
    /// Minimum quiet time between doses from this pump.
    pub min_interval_ms: u64,
    /// Cumulative cap over a trailing 24 h window.
    pub daily_limit_ml: f64,
    /// Expected shift of the controlled parameter per ml dispensed,
    /// used by the deferred effectiveness check (advisory only).
    pub expected_shift_per_ml: f64,
    pub gains: Gains,
}

impl Default for PumpCfg {
    fn default() -> Self {
        Self {
            dose_ml: 0.5,
            flow_rate_ml_s: 1.0,
            min_interval_ms: 120_000,
            daily_limit_ml: 50.0,
            expected_shift_per_ml: 0.1,
            gains: Gains::default(),
        }
    }
}

/// The three pump channels the engine actuates.
#[derive(Debug, Deserialize, Clone, Copy, Default)]
#[serde(default)]
pub struct Pumps {
    pub ph_up: PumpCfg,
    pub ph_down: PumpCfg,
    pub nutrient: PumpCfg,
}

/// Circuit-breaker tuning plus persisted counters.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ErrorHandling {
    /// Consecutive failures before the breaker opens.
    pub threshold: u32,
    /// Cooldown after the last failure before cycles resume.
    pub reset_ms: u64,
    /// Persisted failure count (written back by the engine).
    pub fail_count: u32,
    /// Persisted timestamp of the last failure, ms on the engine clock.
    pub last_failure_ms: Option<u64>,
}

impl Default for ErrorHandling {
    fn default() -> Self {
        Self {
            threshold: 10,
            reset_ms: 300_000,
            fail_count: 0,
            last_failure_ms: None,
        }
    }
}

/// Engine timing knobs, fixed at build time.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Engine {
    /// Attempt limiter window: cycles closer together than this are refused.
    pub min_attempt_interval_ms: u64,
    /// Lock watchdog: a cycle holding the lock longer than this is
    /// force-released.
    pub max_lock_ms: u64,
    /// No dosing until this long after engine start.
    pub startup_delay_ms: u64,
    /// Delay before a dose's effect is re-measured.
    pub effect_check_delay_ms: u64,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            min_attempt_interval_ms: 500,
            max_lock_ms: 30_000,
            startup_delay_ms: 30_000,
            effect_check_delay_ms: 300_000,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Master switch for automated dosing.
    pub enabled: bool,
    pub targets: Targets,
    pub pumps: Pumps,
    pub error_handling: ErrorHandling,
    pub engine: Engine,
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: false,
            targets: Targets::default(),
            pumps: Pumps::default(),
            error_handling: ErrorHandling::default(),
            engine: Engine::default(),
            logging: Logging::default(),
        }
    }
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

fn validate_band(name: &str, band: &TargetBand, lo: f64, hi: f64) -> eyre::Result<()> {
    if !band.target.is_finite() || band.target <= lo || band.target >= hi {
        eyre::bail!("targets.{name}.target must be within ({lo}, {hi})");
    }
    if !band.tolerance.is_finite() || band.tolerance <= 0.0 {
        eyre::bail!("targets.{name}.tolerance must be > 0");
    }
    Ok(())
}

fn validate_pump(name: &str, p: &PumpCfg) -> eyre::Result<()> {
    if !p.dose_ml.is_finite() || p.dose_ml <= 0.0 {
        eyre::bail!("pumps.{name}.dose_ml must be > 0");
    }
    if !p.flow_rate_ml_s.is_finite() || p.flow_rate_ml_s <= 0.0 {
        eyre::bail!("pumps.{name}.flow_rate_ml_s must be > 0");
    }
    if p.min_interval_ms == 0 {
        eyre::bail!("pumps.{name}.min_interval_ms must be >= 1");
    }
    if p.min_interval_ms > 24 * 60 * 60 * 1000 {
        eyre::bail!("pumps.{name}.min_interval_ms is unreasonably large (>24h)");
    }
    if !p.daily_limit_ml.is_finite() || p.daily_limit_ml <= 0.0 {
        eyre::bail!("pumps.{name}.daily_limit_ml must be > 0");
    }
    if !p.expected_shift_per_ml.is_finite() || p.expected_shift_per_ml <= 0.0 {
        eyre::bail!("pumps.{name}.expected_shift_per_ml must be > 0");
    }
    for (g, v) in [
        ("kp", p.gains.kp),
        ("ki", p.gains.ki),
        ("kd", p.gains.kd),
    ] {
        if !v.is_finite() || v < 0.0 {
            eyre::bail!("pumps.{name}.gains.{g} must be finite and >= 0");
        }
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Targets: probe-plausible ranges, matching the engine's sensor
        // sanity bounds.
        validate_band("ph", &self.targets.ph, 0.0, 14.0)?;
        validate_band("ec", &self.targets.ec, 0.0, 5.0)?;

        // Pumps
        validate_pump("ph_up", &self.pumps.ph_up)?;
        validate_pump("ph_down", &self.pumps.ph_down)?;
        validate_pump("nutrient", &self.pumps.nutrient)?;

        // Breaker
        if self.error_handling.threshold == 0 {
            eyre::bail!("error_handling.threshold must be >= 1");
        }
        if self.error_handling.reset_ms == 0 {
            eyre::bail!("error_handling.reset_ms must be >= 1");
        }

        // Engine timing
        if self.engine.min_attempt_interval_ms == 0 {
            eyre::bail!("engine.min_attempt_interval_ms must be >= 1");
        }
        if self.engine.max_lock_ms == 0 {
            eyre::bail!("engine.max_lock_ms must be >= 1");
        }
        if self.engine.max_lock_ms > 5 * 60 * 1000 {
            eyre::bail!("engine.max_lock_ms is unreasonably large (>5min)");
        }
        if self.engine.effect_check_delay_ms == 0 {
            eyre::bail!("engine.effect_check_delay_ms must be >= 1");
        }

        Ok(())
    }
}
