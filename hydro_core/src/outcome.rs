//! Typed result of one dosing cycle.
//!
//! Every `perform_cycle` call terminates in exactly one of these variants;
//! waiting conditions carry enough detail for callers to report a retry
//! horizon without re-deriving engine state.

use crate::error::CycleError;
use hydro_traits::PumpRole;

/// Which controlled parameter a dose or warning refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    Ph,
    Ec,
}

impl Parameter {
    pub fn label(self) -> &'static str {
        match self {
            Parameter::Ph => "pH",
            Parameter::Ec => "EC",
        }
    }
}

/// Why the cycle was refused before any work started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateHold {
    /// Attempt limiter window has not elapsed since the previous call.
    AttemptInterval { remaining_ms: u64 },
    /// Startup safety delay still running.
    Startup { remaining_ms: u64 },
}

/// Why the interval gate refused a pump that the sensors asked for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IntervalHold {
    MinInterval { remaining_ms: u64 },
    DailyLimit { dosed_ml: f64, limit_ml: f64 },
}

/// Terminal outcome of one cycle invocation.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Monitoring kill-switch is set; the engine will not run cycles.
    Aborted { reason: &'static str },
    /// Automated dosing is switched off in configuration.
    Disabled,
    /// Circuit breaker is open; no dosing until the reset time passes.
    CircuitOpen { resets_at_ms: u64 },
    /// Refused before acquiring the lock (attempt limiter or startup delay).
    WaitingRate(RateHold),
    /// Another cycle holds the single-flight lock.
    WaitingLock,
    /// A dose was indicated but the per-pump gate refused it.
    WaitingInterval { pump: PumpRole, hold: IntervalHold },
    /// Exactly one pump dispensed.
    Dosed {
        pump: PumpRole,
        parameter: Parameter,
        amount_ml: f64,
        reading: f64,
        target: f64,
    },
    /// Detected but unactionable condition (EC above range needs dilution).
    Warning {
        parameter: Parameter,
        reading: f64,
        target: f64,
    },
    /// Everything within tolerance; nothing dispensed.
    InRange,
    /// The cycle failed; counted against the circuit breaker.
    Failed(CycleError),
}

impl CycleOutcome {
    /// Stable action name for logs and structured output.
    pub fn action_name(&self) -> &'static str {
        match self {
            CycleOutcome::Aborted { .. } => "aborted",
            CycleOutcome::Disabled => "disabled",
            CycleOutcome::CircuitOpen { .. } => "circuit_open",
            CycleOutcome::WaitingRate(_) => "waiting_rate",
            CycleOutcome::WaitingLock => "waiting_lock",
            CycleOutcome::WaitingInterval { .. } => "waiting_interval",
            CycleOutcome::Dosed { .. } => "dosed",
            CycleOutcome::Warning { .. } => "warning",
            CycleOutcome::InRange => "in_range",
            CycleOutcome::Failed(_) => "error",
        }
    }
}
