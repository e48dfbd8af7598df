//! Maps boxed trait-boundary errors to typed `CycleError`s.
//!
//! The traits in `hydro_traits` use `Box<dyn Error + Send + Sync>` for
//! maximum flexibility; this module converts those to the engine's typed
//! errors, with an optional feature-gated path for
//! `hydro_hardware::HwError` downcasting.

use crate::error::CycleError;
use hydro_traits::PumpRole;

/// Describe a boundary error, preferring the typed hardware error when the
/// feature is enabled, falling back to string heuristics.
fn describe(e: &(dyn std::error::Error + 'static)) -> String {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<hydro_hardware::HwError>() {
            return match hw {
                hydro_hardware::HwError::Timeout => "probe read timed out".to_string(),
                other => other.to_string(),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        "probe read timed out".to_string()
    } else {
        s
    }
}

pub fn map_sensor_error(e: &(dyn std::error::Error + 'static)) -> CycleError {
    CycleError::SensorUnavailable(describe(e))
}

pub fn map_actuator_error(pump: PumpRole, e: &(dyn std::error::Error + 'static)) -> CycleError {
    CycleError::Actuator {
        pump,
        detail: describe(e),
    }
}
