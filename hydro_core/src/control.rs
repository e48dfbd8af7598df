//! Shared monitoring kill-switch.
//!
//! The management surface holds one handle, the engine another. Once
//! disabled, the engine refuses cycles until explicitly re-enabled; the
//! flag is checked before any sensor or pump work.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone)]
pub struct MonitoringControl {
    enabled: Arc<AtomicBool>,
}

impl Default for MonitoringControl {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitoringControl {
    /// Starts enabled; disabling is an explicit operator action.
    pub fn new() -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let a = MonitoringControl::new();
        let b = a.clone();
        assert!(a.is_enabled());
        b.disable();
        assert!(!a.is_enabled());
        a.enable();
        assert!(b.is_enabled());
    }
}
