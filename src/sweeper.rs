//! Background reclamation: expired holds and journal growth.
//!
//! Expiry is lazy everywhere else (readers treat a lapsed hold as
//! available); the sweeper exists so the journal and the in-memory states
//! eventually converge to OPEN instead of accumulating stale HELD entries.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::engine::{Engine, EngineError};
use crate::model::{Event, SlotState};
use crate::observability::HOLDS_SWEPT_TOTAL;

impl Engine {
    /// One sweep pass: per seat, flip every expired hold back to OPEN in a
    /// single journal event. Returns the number of holds reclaimed.
    pub async fn sweep_expired_holds(&self) -> Result<usize, EngineError> {
        let now = self.now();
        let mut swept = 0usize;

        for seat_id in self.all_seat_ids() {
            let Some(rs) = self.seat_slots(&seat_id) else {
                continue;
            };
            let mut guard = rs.write_owned().await;
            let expired: Vec<_> = guard
                .slots
                .iter()
                .filter(|s| {
                    matches!(s.state, SlotState::Held { expires_at, .. } if expires_at <= now)
                })
                .map(|s| s.id)
                .collect();
            if expired.is_empty() {
                continue;
            }
            swept += expired.len();
            let event = Event::HoldsSwept {
                seat_id,
                slot_ids: expired,
            };
            self.persist_and_apply(&mut guard, &event).await?;
        }

        if swept > 0 {
            metrics::counter!(HOLDS_SWEPT_TOTAL).increment(swept as u64);
            debug!(swept, "expired holds reclaimed");
        }
        Ok(swept)
    }
}

/// Periodic sweep loop. Also triggers journal compaction once enough
/// appends have accumulated since the last one. Runs until the engine's
/// last reference is dropped.
pub async fn run_sweeper(engine: Arc<Engine>, period: Duration) {
    let threshold = engine.config().compact_threshold;
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(period_ms = period.as_millis() as u64, "sweeper started");

    loop {
        ticker.tick().await;
        if let Err(e) = engine.sweep_expired_holds().await {
            error!(error = %e, "hold sweep failed");
        }
        if engine.journal_appends_since_compact().await > threshold {
            match engine.compact_journal().await {
                Ok(()) => info!("journal compacted"),
                Err(e) => error!(error = %e, "journal compaction failed"),
            }
        }
    }
}
