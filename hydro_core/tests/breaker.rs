use hydro_core::{CircuitBreaker, ErrorCounters};
use rstest::rstest;

#[rstest]
#[case(1, 1_000)]
#[case(3, 1_000)]
#[case(10, 300_000)]
fn opens_after_threshold_consecutive_failures(#[case] threshold: u32, #[case] reset_ms: u64) {
    let mut b = CircuitBreaker::new(threshold, reset_ms);
    let mut now = 0u64;
    for i in 0..threshold {
        assert!(
            !b.is_open(now),
            "breaker opened early at failure {i} of {threshold}"
        );
        now += 10;
        b.record_failure(now);
    }
    // At the threshold: open for the whole reset window...
    assert!(b.is_open(now));
    assert!(b.is_open(now + reset_ms - 1));
    // ...and readable as closed the instant the window elapses.
    assert!(!b.is_open(now + reset_ms));
}

#[rstest]
#[case(0)]
#[case(5)]
#[case(9)]
fn a_success_anywhere_in_the_streak_resets_it(#[case] successes_after: u32) {
    let mut b = CircuitBreaker::new(10, 300_000);
    let mut now = 0u64;
    for _ in 0..successes_after {
        now += 10;
        b.record_failure(now);
    }
    b.record_success();
    for _ in 0..9 {
        now += 10;
        b.record_failure(now);
    }
    assert!(
        !b.is_open(now),
        "nine failures after a success must stay below a threshold of ten"
    );
}

#[test]
fn failures_spread_wider_than_the_window_still_count() {
    // The count is consecutive-failures, not failures-per-window: only the
    // openness check is time-bound.
    let mut b = CircuitBreaker::new(3, 1_000);
    b.record_failure(0);
    b.record_failure(5_000);
    b.record_failure(10_000);
    assert!(b.is_open(10_500));
    assert_eq!(b.resets_at_ms(), Some(11_000));
}

#[test]
fn persisted_counters_round_trip_through_the_config_shape() {
    let counters = ErrorCounters {
        threshold: 4,
        reset_ms: 60_000,
        fail_count: 4,
        last_failure_ms: Some(1_000),
    };
    let b = CircuitBreaker::from_counters(&counters);
    assert!(b.is_open(2_000));
    assert_eq!(b.fail_count(), counters.fail_count);
    assert_eq!(b.last_failure_ms(), counters.last_failure_ms);
}
