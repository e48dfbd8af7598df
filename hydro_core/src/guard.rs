//! Single-flight guard for the dosing cycle.
//!
//! Combines three protections:
//! - an attempt limiter that refuses cycles scheduled closer together than
//!   `min_attempt_interval_ms` (the attempt stamp moves on every call, so a
//!   request storm cannot keep resetting the window in its own favor);
//! - a single-flight lock so no cycle runs inside another;
//! - a lock watchdog that force-releases after `max_lock_ms` if the permit
//!   is never released (hung actuator call), plus a lazy stale-lock reclaim
//!   in `try_acquire` so manual-clock tests observe the same recovery.
//!
//! `CyclePermit` releases on drop with a generation check, so release is
//! idempotent and happens on every exit path of the cycle.

use crate::timer::OneShot;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct LockState {
    in_progress: bool,
    last_attempt_ms: Option<u64>,
    acquired_at_ms: u64,
    generation: u64,
}

fn lock_state(state: &Mutex<LockState>) -> MutexGuard<'_, LockState> {
    // A panic while holding the lock only interrupts bookkeeping; the
    // state itself stays coherent, so poisoning is ignored.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct CycleGuard {
    state: Arc<Mutex<LockState>>,
    min_attempt_interval_ms: u64,
    max_lock_ms: u64,
}

impl CycleGuard {
    pub fn new(min_attempt_interval_ms: u64, max_lock_ms: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(LockState::default())),
            min_attempt_interval_ms: min_attempt_interval_ms.max(1),
            max_lock_ms: max_lock_ms.max(1),
        }
    }

    /// Stamp this attempt. Returns `Some(remaining_ms)` when the previous
    /// attempt was too recent; the stamp is updated either way.
    pub fn note_attempt(&self, now_ms: u64) -> Option<u64> {
        let mut s = lock_state(&self.state);
        let verdict = match s.last_attempt_ms {
            Some(prev) if now_ms.saturating_sub(prev) < self.min_attempt_interval_ms => {
                Some(self.min_attempt_interval_ms - now_ms.saturating_sub(prev))
            }
            _ => None,
        };
        s.last_attempt_ms = Some(now_ms);
        verdict
    }

    /// Take the single-flight lock, or `None` while another cycle holds it.
    pub fn try_acquire(&self, now_ms: u64) -> Option<CyclePermit> {
        let generation;
        {
            let mut s = lock_state(&self.state);
            if s.in_progress {
                let held_for = now_ms.saturating_sub(s.acquired_at_ms);
                if held_for < self.max_lock_ms {
                    return None;
                }
                tracing::warn!(held_for_ms = held_for, "reclaiming stale cycle lock");
            }
            s.in_progress = true;
            s.acquired_at_ms = now_ms;
            s.generation = s.generation.wrapping_add(1);
            generation = s.generation;
        }

        let watchdog_state = Arc::clone(&self.state);
        let watchdog = OneShot::spawn(Duration::from_millis(self.max_lock_ms), move || {
            let mut s = lock_state(&watchdog_state);
            if s.in_progress && s.generation == generation {
                s.in_progress = false;
                tracing::warn!("cycle lock force-released by watchdog");
            }
        });

        Some(CyclePermit {
            state: Arc::clone(&self.state),
            generation,
            watchdog: Some(watchdog),
            released: false,
        })
    }

    pub fn is_locked(&self) -> bool {
        lock_state(&self.state).in_progress
    }
}

/// RAII handle for one in-flight cycle.
pub struct CyclePermit {
    state: Arc<Mutex<LockState>>,
    generation: u64,
    watchdog: Option<OneShot>,
    released: bool,
}

impl CyclePermit {
    /// Explicit release; also runs on drop, and is idempotent either way.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        {
            let mut s = lock_state(&self.state);
            // Generation mismatch means the watchdog already reclaimed the
            // lock and a newer cycle may own it now; leave it alone.
            if s.in_progress && s.generation == self.generation {
                s.in_progress = false;
            }
        }
        // Cancels and joins the watchdog thread (state lock released above).
        self.watchdog.take();
    }
}

impl Drop for CyclePermit {
    fn drop(&mut self) {
        self.release_inner();
    }
}
