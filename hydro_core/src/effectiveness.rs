//! Deferred dose-effect checks and the advisory dose factor.
//!
//! After each dispense the engine schedules a one-shot re-read of the
//! affected parameter. The realized shift is compared to the expected
//! shift (`amount_ml * expected_shift_per_ml`) and the smoothed ratio is
//! folded into a per-pump multiplier applied to future base doses. The
//! adjustment is advisory: nothing here ever actuates a pump, and a failed
//! re-read is logged and discarded without touching the circuit breaker.

use crate::outcome::Parameter;
use crate::timer::OneShot;
use hydro_traits::PumpRole;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Bounds on the advisory multiplier.
pub const FACTOR_MIN: f64 = 0.25;
pub const FACTOR_MAX: f64 = 4.0;
/// EMA weight of a fresh observation.
pub const FACTOR_SMOOTHING: f64 = 0.3;
/// Realized shifts smaller than this are treated as "no measurable effect".
pub const MIN_REALIZED_DELTA: f64 = 1e-3;

type Factors = HashMap<PumpRole, f64>;

pub struct EffectivenessTracker {
    factors: Arc<Mutex<Factors>>,
    pending: Vec<OneShot>,
    delay: Duration,
}

impl EffectivenessTracker {
    pub fn new(delay: Duration) -> Self {
        Self {
            factors: Arc::new(Mutex::new(HashMap::new())),
            pending: Vec::new(),
            delay,
        }
    }

    /// Current advisory multiplier for `pump` (1.0 until learned).
    pub fn dose_factor(&self, pump: PumpRole) -> f64 {
        self.factors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&pump)
            .copied()
            .unwrap_or(1.0)
    }

    /// Number of checks still waiting to fire.
    pub fn pending_checks(&self) -> usize {
        self.pending.iter().filter(|t| !t.is_finished()).count()
    }

    /// Cancel every pending check (engine shutdown / kill switch).
    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }

    /// Arm a deferred re-read for a dose just dispensed.
    ///
    /// `expected_delta` is signed toward the intended direction (negative
    /// for the lowering pump). `read_back` re-reads the parameter at check
    /// time and returns `None` when the sensor is unavailable.
    pub fn schedule_check<F>(
        &mut self,
        pump: PumpRole,
        parameter: Parameter,
        before: f64,
        expected_delta: f64,
        read_back: F,
    ) where
        F: FnOnce() -> Option<f64> + Send + 'static,
    {
        // Completed handles are only bookkeeping at this point.
        self.pending.retain(|t| !t.is_finished());

        let factors = Arc::clone(&self.factors);
        let task = move || {
            let Some(after) = read_back() else {
                tracing::warn!(
                    pump = pump.label(),
                    parameter = parameter.label(),
                    "effectiveness check skipped: sensor unavailable"
                );
                return;
            };
            let realized = after - before;
            // Align both deltas to the intended direction.
            let aligned_realized = realized * expected_delta.signum();
            let aligned_expected = expected_delta.abs();
            if aligned_expected <= 0.0 {
                return;
            }

            let candidate = if aligned_realized < MIN_REALIZED_DELTA {
                // Dose had no measurable effect (or moved the wrong way);
                // lean toward larger doses, capped hard.
                FACTOR_MAX
            } else {
                (aligned_expected / aligned_realized).clamp(FACTOR_MIN, FACTOR_MAX)
            };

            let mut map = factors.lock().unwrap_or_else(PoisonError::into_inner);
            let current = map.get(&pump).copied().unwrap_or(1.0);
            let updated = (current + FACTOR_SMOOTHING * (candidate - current))
                .clamp(FACTOR_MIN, FACTOR_MAX);
            map.insert(pump, updated);
            tracing::info!(
                pump = pump.label(),
                parameter = parameter.label(),
                before,
                after,
                expected_delta,
                factor = updated,
                "effectiveness check complete"
            );
        };

        self.pending.push(OneShot::spawn(self.delay, task));
    }
}

impl Drop for EffectivenessTracker {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn wait_for_settled(tracker: &EffectivenessTracker) {
        for _ in 0..100 {
            if tracker.pending_checks() == 0 {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("effectiveness check did not complete");
    }

    #[test]
    fn factor_defaults_to_unity() {
        let t = EffectivenessTracker::new(Duration::from_secs(300));
        assert!((t.dose_factor(PumpRole::PhUp) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn under_delivery_raises_the_factor() {
        let mut t = EffectivenessTracker::new(Duration::from_millis(1));
        // Expected +0.2 pH, realized +0.05 -> candidate 4.0 (clamped).
        t.schedule_check(PumpRole::PhUp, Parameter::Ph, 5.5, 0.2, || Some(5.55));
        wait_for_settled(&t);
        let f = t.dose_factor(PumpRole::PhUp);
        assert!(f > 1.0, "factor should grow, got {f}");
        assert!(f <= FACTOR_MAX);
    }

    #[test]
    fn over_delivery_lowers_the_factor() {
        let mut t = EffectivenessTracker::new(Duration::from_millis(1));
        // Expected +0.1, realized +0.4 -> candidate 0.25 (clamped).
        t.schedule_check(PumpRole::Nutrient, Parameter::Ec, 1.0, 0.1, || Some(1.4));
        wait_for_settled(&t);
        let f = t.dose_factor(PumpRole::Nutrient);
        assert!(f < 1.0, "factor should shrink, got {f}");
        assert!(f >= FACTOR_MIN);
    }

    #[test]
    fn lowering_pump_uses_signed_expectation() {
        let mut t = EffectivenessTracker::new(Duration::from_millis(1));
        // pH Down: expected -0.2, realized -0.2 -> candidate 1.0, factor stays.
        t.schedule_check(PumpRole::PhDown, Parameter::Ph, 6.6, -0.2, || Some(6.4));
        wait_for_settled(&t);
        assert!((t.dose_factor(PumpRole::PhDown) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn failed_read_back_is_discarded() {
        let mut t = EffectivenessTracker::new(Duration::from_millis(1));
        t.schedule_check(PumpRole::PhUp, Parameter::Ph, 5.5, 0.2, || None);
        wait_for_settled(&t);
        assert!((t.dose_factor(PumpRole::PhUp) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cancel_all_drops_pending_checks() {
        let mut t = EffectivenessTracker::new(Duration::from_secs(60));
        t.schedule_check(PumpRole::PhUp, Parameter::Ph, 5.5, 0.2, || Some(9.9));
        assert_eq!(t.pending_checks(), 1);
        t.cancel_all();
        assert_eq!(t.pending_checks(), 0);
        assert!((t.dose_factor(PumpRole::PhUp) - 1.0).abs() < 1e-9);
    }
}
