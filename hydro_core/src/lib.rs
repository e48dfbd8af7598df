#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Auto-dosing decision engine (hardware-agnostic).
//!
//! Regulates pH and nutrient concentration (EC) of a hydroponic reservoir
//! by sizing and triggering metered pump doses from sensor feedback. All
//! hardware interactions go through the `hydro_traits::SensorSource` and
//! `hydro_traits::PumpActuator` traits.
//!
//! ## Architecture
//!
//! - **Sizing**: PID dose calculator with anti-windup (`pid` module)
//! - **Protection**: circuit breaker over consecutive cycle failures
//!   (`breaker`), single-flight lock with attempt limiter and watchdog
//!   (`guard`), per-pump cooldown and daily-volume gate (`gate`)
//! - **Feedback**: deferred effectiveness checks feeding an advisory dose
//!   factor (`effectiveness`)
//! - **Orchestration**: the cycle driver and builders (`engine`), with a
//!   typed per-cycle outcome (`outcome`)
//!
//! A cycle dispenses at most once, never runs inside another cycle, and
//! releases its lock on every exit path.

pub mod breaker;
pub mod config;
pub mod control;
pub mod conversions;
pub mod effectiveness;
pub mod engine;
pub mod error;
pub mod gate;
pub mod guard;
pub mod history;
pub mod mapping;
pub mod mocks;
pub mod outcome;
pub mod pid;
pub mod store;
pub mod timer;

pub use breaker::CircuitBreaker;
pub use config::{
    DosingConfig, EngineCfg, ErrorCounters, PidGains, PumpSettings, PumpTable, TargetBand, Targets,
};
pub use control::MonitoringControl;
pub use effectiveness::EffectivenessTracker;
pub use engine::{
    AutoDoser, AutoDoserBuilder, AutoDoserCore, EC_FALLBACK, EngineStatus, Missing, PH_FALLBACK,
    Set, build_doser,
};
pub use error::{BuildError, CycleError};
pub use guard::{CycleGuard, CyclePermit};
pub use history::{DAILY_WINDOW_MS, DoseHistory, DoseRecord};
pub use outcome::{CycleOutcome, IntervalHold, Parameter, RateHold};
pub use store::{ConfigPatch, ConfigStore, MemoryConfigStore};

// Re-export the clock seam so downstream crates don't need hydro_traits
// just for deterministic time.
pub use hydro_traits::clock::{Clock, MonotonicClock};
