//! Failure-rate circuit breaker for the dosing cycle.
//!
//! Repeated cycle failures (sensor loss, actuator faults) open the breaker
//! and suspend physical dispensing until a cooldown elapses. The count is
//! not auto-reset when the cooldown passes: the next recorded success or
//! failure decides the new state, which gives an implicit half-open probe
//! on the first cycle after the window.

use crate::config::ErrorCounters;

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreaker {
    threshold: u32,
    reset_ms: u64,
    fail_count: u32,
    last_failure_ms: Option<u64>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, reset_ms: u64) -> Self {
        Self {
            threshold: threshold.max(1),
            reset_ms: reset_ms.max(1),
            fail_count: 0,
            last_failure_ms: None,
        }
    }

    /// Resume from persisted counters (engine restart keeps breaker history).
    pub fn from_counters(c: &ErrorCounters) -> Self {
        Self {
            threshold: c.threshold.max(1),
            reset_ms: c.reset_ms.max(1),
            fail_count: c.fail_count,
            last_failure_ms: c.last_failure_ms,
        }
    }

    pub fn record_failure(&mut self, now_ms: u64) {
        self.fail_count = self.fail_count.saturating_add(1);
        self.last_failure_ms = Some(now_ms);
        tracing::warn!(
            fail_count = self.fail_count,
            threshold = self.threshold,
            "cycle failure recorded"
        );
    }

    pub fn record_success(&mut self) {
        if self.fail_count > 0 {
            tracing::debug!(cleared = self.fail_count, "failure streak cleared");
        }
        self.fail_count = 0;
    }

    /// Open while the streak has hit the threshold and the cooldown since
    /// the last failure has not yet elapsed.
    pub fn is_open(&self, now_ms: u64) -> bool {
        self.fail_count >= self.threshold
            && matches!(self.last_failure_ms,
                Some(t) if now_ms.saturating_sub(t) < self.reset_ms)
    }

    /// When the cooldown window ends, if a failure has ever been recorded.
    pub fn resets_at_ms(&self) -> Option<u64> {
        self.last_failure_ms.map(|t| t.saturating_add(self.reset_ms))
    }

    pub fn fail_count(&self) -> u32 {
        self.fail_count
    }

    pub fn last_failure_ms(&self) -> Option<u64> {
        self.last_failure_ms
    }
}
