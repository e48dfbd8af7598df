//! Per-pump interval gate: cooldown and daily-volume limiter.
//!
//! `can_dose` is a pure predicate over the dose history; nothing here
//! mutates state. Recording happens in `DoseHistory::record` only after a
//! dispense actually succeeded.

use crate::config::PumpSettings;
use crate::history::{DAILY_WINDOW_MS, DoseHistory};
use crate::outcome::IntervalHold;
use hydro_traits::PumpRole;

/// Check whether `pump` may dose now. `Err` carries the reason to wait.
pub fn can_dose(
    pump: PumpRole,
    settings: &PumpSettings,
    now_ms: u64,
    history: &DoseHistory,
) -> Result<(), IntervalHold> {
    if let Some(last) = history.last_dose_ms(pump) {
        let since = now_ms.saturating_sub(last);
        if since < settings.min_interval_ms {
            return Err(IntervalHold::MinInterval {
                remaining_ms: settings.min_interval_ms - since,
            });
        }
    }

    let dosed_ml = history.dosed_ml_within(pump, now_ms, DAILY_WINDOW_MS);
    if dosed_ml >= settings.daily_limit_ml {
        return Err(IntervalHold::DailyLimit {
            dosed_ml,
            limit_ml: settings.daily_limit_ml,
        });
    }

    Ok(())
}
