//! PID-based dose sizing.
//!
//! One controller instance exists per parameter (pH, EC), not per pump:
//! both pH pumps act on the same error signal and the firing direction
//! decides which one runs. The lowering pump is fed the inverted
//! current/target pair by the caller, so from this module's point of view
//! a positive error always means "dispense more of this reagent".

use crate::config::PidGains;

/// Anti-windup bound on the integral term (either direction).
pub const INTEGRAL_LIMIT: f64 = 10.0;
/// Floor on dt to keep derivative/integral math finite on back-to-back calls.
pub const DT_EPSILON_S: f64 = 0.001;
/// Smallest dose worth actuating; anything below rounds up to this.
pub const MIN_DOSE_ML: f64 = 0.1;
/// Ceiling on a single dose as a multiple of the configured base amount.
pub const MAX_DOSE_FACTOR: f64 = 3.0;

/// Controller memory carried across cycles for one parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct PidState {
    pub integral: f64,
    pub last_error: f64,
    /// `None` until the first update; the first call runs proportional-only.
    pub last_update_ms: Option<u64>,
}

/// Size a corrective dose from the current error signal.
///
/// Returns the clamped dose volume and the updated controller state; the
/// caller persists the state keyed by parameter.
pub fn compute_dose(
    current: f64,
    target: f64,
    gains: PidGains,
    base_dose_ml: f64,
    state: PidState,
    now_ms: u64,
) -> (f64, PidState) {
    let error = target - current;

    let (dt_s, derivative) = match state.last_update_ms {
        Some(prev) => {
            let dt = ((now_ms.saturating_sub(prev)) as f64 / 1000.0).max(DT_EPSILON_S);
            (dt, (error - state.last_error) / dt)
        }
        // First sample: no history to differentiate against.
        None => (DT_EPSILON_S, 0.0),
    };

    let integral = (state.integral + error * dt_s).clamp(-INTEGRAL_LIMIT, INTEGRAL_LIMIT);
    let raw = gains.kp * error + gains.ki * integral + gains.kd * derivative;

    let ceiling = (MAX_DOSE_FACTOR * base_dose_ml).max(MIN_DOSE_ML);
    let amount = (base_dose_ml * (1.0 + raw)).clamp(MIN_DOSE_ML, ceiling);

    let next = PidState {
        integral,
        last_error: error,
        last_update_ms: Some(now_ms),
    };
    (amount, next)
}
