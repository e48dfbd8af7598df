use hydro_traits::PumpRole;
use thiserror::Error;

/// Failures that terminate a cycle and count against the circuit breaker.
///
/// Transient "waiting" conditions (rate limit, lock contention, open
/// breaker, interval gate) are not errors; they are ordinary outcomes and
/// never reach this type.
#[derive(Debug, Error, Clone)]
pub enum CycleError {
    #[error("sensor unavailable: {0}")]
    SensorUnavailable(String),
    #[error("dispense failed on {pump:?}: {detail}")]
    Actuator { pump: PumpRole, detail: String },
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing sensor source")]
    MissingSensor,
    #[error("missing pump actuator")]
    MissingPumps,
    #[error("missing config store")]
    MissingStore,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
