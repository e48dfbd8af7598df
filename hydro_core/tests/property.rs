use hydro_core::pid::{self, INTEGRAL_LIMIT, MAX_DOSE_FACTOR, MIN_DOSE_ML, PidState};
use hydro_core::{DoseHistory, PidGains, PumpSettings, gate};
use hydro_traits::PumpRole;
use proptest::prelude::*;

fn gains_strategy() -> impl Strategy<Value = PidGains> {
    (0.0f64..5.0, 0.0f64..1.0, 0.0f64..1.0).prop_map(|(kp, ki, kd)| PidGains { kp, ki, kd })
}

proptest! {
    // Larger error (same sign) never yields a smaller dose, up to the clamp.
    #[test]
    fn dose_is_monotonic_in_error(
        gains in gains_strategy(),
        base in 0.1f64..5.0,
        err_a in 0.0f64..3.0,
        err_b in 0.0f64..3.0,
    ) {
        let target = 6.0;
        let (lo, hi) = if err_a <= err_b { (err_a, err_b) } else { (err_b, err_a) };
        let (amount_small, _) =
            pid::compute_dose(target - lo, target, gains, base, PidState::default(), 1_000);
        let (amount_large, _) =
            pid::compute_dose(target - hi, target, gains, base, PidState::default(), 1_000);
        prop_assert!(amount_large >= amount_small - 1e-12,
            "amount({hi}) = {amount_large} < amount({lo}) = {amount_small}");
    }

    // Output is always inside the configured clamp band.
    #[test]
    fn dose_respects_clamp_bounds(
        gains in gains_strategy(),
        base in 0.1f64..5.0,
        current in 0.0f64..14.0,
        target in 0.0f64..14.0,
        integral in -INTEGRAL_LIMIT..INTEGRAL_LIMIT,
        last_error in -5.0f64..5.0,
        dt_ms in 0u64..600_000,
    ) {
        let state = PidState { integral, last_error, last_update_ms: Some(0) };
        let (amount, next) = pid::compute_dose(current, target, gains, base, state, dt_ms);
        let ceiling = (MAX_DOSE_FACTOR * base).max(MIN_DOSE_ML);
        prop_assert!(amount >= MIN_DOSE_ML - 1e-12);
        prop_assert!(amount <= ceiling + 1e-12);
        prop_assert!(next.integral.abs() <= INTEGRAL_LIMIT + 1e-12);
    }

    // The integral stays bounded no matter how long the error persists.
    #[test]
    fn integral_never_winds_up(
        gains in gains_strategy(),
        error_signal in -3.0f64..3.0,
        steps in 1usize..500,
        step_ms in 1u64..120_000,
    ) {
        let target = 6.0;
        let current = target - error_signal;
        let mut state = PidState::default();
        let mut now = 0u64;
        for _ in 0..steps {
            now += step_ms;
            let (_, next) = pid::compute_dose(current, target, gains, 0.5, state, now);
            state = next;
        }
        prop_assert!(state.integral.abs() <= INTEGRAL_LIMIT + 1e-12);
    }

    // The gate is a pure predicate: repeated queries with no intervening
    // record return the same verdict.
    #[test]
    fn gate_is_idempotent(
        doses in prop::collection::vec((0u64..86_400_000, 0.1f64..5.0), 0..40),
        min_interval_ms in 1u64..3_600_000,
        daily_limit_ml in 0.5f64..100.0,
        now in 0u64..172_800_000,
    ) {
        let mut history = DoseHistory::new();
        let mut at = doses.clone();
        at.sort_by_key(|(t, _)| *t);
        for (t, ml) in at {
            history.record(PumpRole::Nutrient, ml, t);
        }
        let settings = PumpSettings {
            min_interval_ms,
            daily_limit_ml,
            ..PumpSettings::default()
        };
        let first = gate::can_dose(PumpRole::Nutrient, &settings, now, &history);
        for _ in 0..3 {
            prop_assert_eq!(first, gate::can_dose(PumpRole::Nutrient, &settings, now, &history));
        }
    }
}
