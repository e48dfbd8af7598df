//! `From` implementations bridging `hydro_config` types to `hydro_core` types.
//!
//! These keep the TOML schema and the runtime structs from drifting apart
//! without manual field mapping in the CLI.

use crate::config::{
    DosingConfig, EngineCfg, ErrorCounters, PidGains, PumpSettings, PumpTable, TargetBand, Targets,
};

impl From<&hydro_config::TargetBand> for TargetBand {
    fn from(c: &hydro_config::TargetBand) -> Self {
        Self {
            target: c.target,
            tolerance: c.tolerance,
        }
    }
}

impl From<&hydro_config::Targets> for Targets {
    fn from(c: &hydro_config::Targets) -> Self {
        Self {
            ph: (&c.ph).into(),
            ec: (&c.ec).into(),
        }
    }
}

impl From<&hydro_config::Gains> for PidGains {
    fn from(c: &hydro_config::Gains) -> Self {
        Self {
            kp: c.kp,
            ki: c.ki,
            kd: c.kd,
        }
    }
}

impl From<&hydro_config::PumpCfg> for PumpSettings {
    fn from(c: &hydro_config::PumpCfg) -> Self {
        Self {
            dose_ml: c.dose_ml,
            flow_rate_ml_s: c.flow_rate_ml_s,
            min_interval_ms: c.min_interval_ms,
            daily_limit_ml: c.daily_limit_ml,
            expected_shift_per_ml: c.expected_shift_per_ml,
            gains: (&c.gains).into(),
        }
    }
}

impl From<&hydro_config::Pumps> for PumpTable {
    fn from(c: &hydro_config::Pumps) -> Self {
        Self {
            ph_up: (&c.ph_up).into(),
            ph_down: (&c.ph_down).into(),
            nutrient: (&c.nutrient).into(),
        }
    }
}

impl From<&hydro_config::ErrorHandling> for ErrorCounters {
    fn from(c: &hydro_config::ErrorHandling) -> Self {
        Self {
            threshold: c.threshold,
            reset_ms: c.reset_ms,
            fail_count: c.fail_count,
            last_failure_ms: c.last_failure_ms,
        }
    }
}

impl From<&hydro_config::Engine> for EngineCfg {
    fn from(c: &hydro_config::Engine) -> Self {
        Self {
            min_attempt_interval_ms: c.min_attempt_interval_ms,
            max_lock_ms: c.max_lock_ms,
            startup_delay_ms: c.startup_delay_ms,
            effect_check_delay_ms: c.effect_check_delay_ms,
        }
    }
}

impl From<&hydro_config::Config> for DosingConfig {
    fn from(c: &hydro_config::Config) -> Self {
        Self {
            enabled: c.enabled,
            targets: (&c.targets).into(),
            pumps: (&c.pumps).into(),
            error_handling: (&c.error_handling).into(),
        }
    }
}
