//! Configuration store seam.
//!
//! Persistence (JSON/TOML files, a database, a web API) lives outside the
//! engine; the engine only needs a snapshot per cycle and an atomic
//! merge-style update for the pieces it writes back (breaker counters) and
//! the pieces the management surface edits (enabled flag, targets, pumps).

use crate::config::{DosingConfig, PumpTable, Targets};
use std::sync::{Arc, Mutex, PoisonError};

/// Partial update applied atomically; unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ConfigPatch {
    pub enabled: Option<bool>,
    pub targets: Option<Targets>,
    pub pumps: Option<PumpTable>,
    pub fail_count: Option<u32>,
    /// `Some(None)` clears the stamp; `None` leaves it untouched.
    pub last_failure_ms: Option<Option<u64>>,
}

impl ConfigPatch {
    /// Patch carrying only breaker counters (the engine's write-back).
    pub fn breaker_counters(fail_count: u32, last_failure_ms: Option<u64>) -> Self {
        Self {
            fail_count: Some(fail_count),
            last_failure_ms: Some(last_failure_ms),
            ..Self::default()
        }
    }
}

pub trait ConfigStore {
    /// Snapshot of the current configuration.
    fn get(&self) -> DosingConfig;
    /// Atomic merge-and-persist; returns the configuration after the merge.
    fn update(&self, patch: ConfigPatch) -> DosingConfig;
}

impl<T: ConfigStore + ?Sized> ConfigStore for Box<T> {
    fn get(&self) -> DosingConfig {
        (**self).get()
    }

    fn update(&self, patch: ConfigPatch) -> DosingConfig {
        (**self).update(patch)
    }
}

/// Shared in-memory store. Clones observe the same configuration, which
/// lets tests and the CLI hold a handle next to the engine's copy.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    inner: Arc<Mutex<DosingConfig>>,
}

impl MemoryConfigStore {
    pub fn new(config: DosingConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(config)),
        }
    }

    /// Another handle onto the same configuration.
    pub fn handle(&self) -> Self {
        self.clone()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self) -> DosingConfig {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, patch: ConfigPatch) -> DosingConfig {
        let mut cfg = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(enabled) = patch.enabled {
            cfg.enabled = enabled;
        }
        if let Some(targets) = patch.targets {
            cfg.targets = targets;
        }
        if let Some(pumps) = patch.pumps {
            cfg.pumps = pumps;
        }
        if let Some(fail_count) = patch.fail_count {
            cfg.error_handling.fail_count = fail_count;
        }
        if let Some(last_failure_ms) = patch.last_failure_ms {
            cfg.error_handling.last_failure_ms = last_failure_ms;
        }
        cfg.clone()
    }
}
