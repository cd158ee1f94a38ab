use std::time::Duration;

use chrono::NaiveTime;

use crate::model::{Ms, OpenHours};

/// Engine policy knobs, threaded in at construction instead of read from
/// ambient globals.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a hold lasts before lazy expiry.
    pub hold_ttl_ms: Ms,
    /// Concurrent non-expired holds allowed per user.
    pub max_holds_per_user: usize,
    /// Cancellation cutoff before slot start.
    pub cancellation_window_ms: Ms,
    /// Fallback daily hours when neither workspace nor coworking supplies them.
    pub default_hours: OpenHours,
    /// Slot duration used by bulk generation.
    pub default_slot_minutes: u32,
    /// Currency recorded on bookings.
    pub currency: String,
    /// Expiry sweeper period.
    pub sweep_period: Duration,
    /// Journal appends before the sweeper triggers compaction.
    pub compact_threshold: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hold_ttl_ms: 10 * 60 * 1000,
            max_holds_per_user: 3,
            cancellation_window_ms: 2 * 60 * 60 * 1000,
            default_hours: OpenHours {
                open: NaiveTime::from_hms_opt(9, 0, 0).expect("valid time"),
                close: NaiveTime::from_hms_opt(21, 0, 0).expect("valid time"),
            },
            default_slot_minutes: 60,
            currency: "RUB".into(),
            sweep_period: Duration::from_secs(30),
            compact_threshold: 1000,
        }
    }
}
