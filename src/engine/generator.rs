use chrono::{Datelike, NaiveDate, NaiveTime};
use tracing::{info, warn};
use ulid::Ulid;

use crate::engine::{conflict, Engine, EngineError};
use crate::limits::{MAX_GENERATION_DAYS, MAX_SLOTS_PER_SEAT};
use crate::model::{CalendarSlot, Event, Ms, SlotState, Span};
use crate::observability::SLOTS_GENERATED_TOTAL;

fn to_ms(date: NaiveDate, time: NaiveTime) -> Ms {
    date.and_time(time).and_utc().timestamp_millis()
}

impl Engine {
    /// Materialize the open-hours grid for every active seat of a
    /// workspace over an inclusive date range. Weekends are skipped.
    /// Re-running over the same range is a no-op for slots that already
    /// exist; returns the number of slots actually created.
    pub async fn generate_slots(
        &self,
        workspace_id: Ulid,
        start_date: NaiveDate,
        end_date: NaiveDate,
        open: Option<NaiveTime>,
        close: Option<NaiveTime>,
        duration_minutes: u32,
    ) -> Result<usize, EngineError> {
        if !self.catalog.workspace_is_active(&workspace_id) {
            return Err(EngineError::InvalidWorkspace(workspace_id));
        }
        if duration_minutes == 0 || duration_minutes > 24 * 60 {
            return Err(EngineError::InvalidDuration(duration_minutes as i64));
        }
        if end_date < start_date {
            return Err(EngineError::InvalidRange {
                start: to_ms(start_date, NaiveTime::MIN),
                end: to_ms(end_date, NaiveTime::MIN),
            });
        }
        let days = (end_date - start_date).num_days() + 1;
        if days > MAX_GENERATION_DAYS {
            return Err(EngineError::LimitExceeded("generation range too long"));
        }

        let hours = self
            .catalog
            .operating_hours(&workspace_id)
            .unwrap_or(self.config().default_hours);
        let open = open.unwrap_or(hours.open);
        let close = close.unwrap_or(hours.close);
        if open >= close {
            return Err(EngineError::LimitExceeded("open hours reversed"));
        }

        let seats = self.catalog.active_seats(&workspace_id);
        if seats.is_empty() {
            return Err(EngineError::NoActiveSeats(workspace_id));
        }

        let duration_ms = duration_minutes as Ms * 60_000;
        let now = self.now();
        let mut created = 0usize;

        for seat_id in seats {
            let Some(rs) = self.seat_slots(&seat_id) else {
                continue;
            };
            let mut guard = rs.write_owned().await;

            let mut fresh: Vec<CalendarSlot> = Vec::new();
            let mut date = start_date;
            while date <= end_date {
                if date.weekday().number_from_monday() <= 5 {
                    let day_close = to_ms(date, close);
                    let mut start = to_ms(date, open);
                    while start + duration_ms <= day_close {
                        let span = Span::new(start, start + duration_ms);
                        if guard.exists(&span).is_none()
                            && conflict::check_no_conflict(&guard, &span, now, None).is_ok()
                        {
                            fresh.push(CalendarSlot {
                                id: Ulid::new(),
                                seat_id,
                                span,
                                state: SlotState::Open,
                            });
                        }
                        start += duration_ms;
                    }
                }
                date = date.succ_opt().ok_or(EngineError::LimitExceeded("date overflow"))?;
            }

            if guard.slots.len() + fresh.len() > MAX_SLOTS_PER_SEAT {
                return Err(EngineError::LimitExceeded("too many slots for seat"));
            }
            if fresh.is_empty() {
                continue;
            }

            created += fresh.len();
            let event = Event::SlotsGenerated {
                seat_id,
                slots: fresh,
            };
            self.persist_and_apply(&mut guard, &event).await?;
        }

        metrics::counter!(SLOTS_GENERATED_TOTAL).increment(created as u64);
        info!(%workspace_id, created, "generated slots");
        Ok(created)
    }

    /// Scheduled generation across the whole catalog: every active
    /// workspace gets the standard hour-long grid for the range. A
    /// failing workspace is logged and skipped, not fatal.
    pub async fn generate_for_all_workspaces(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> usize {
        let mut created = 0usize;
        for workspace_id in self.catalog.active_workspaces() {
            match self
                .generate_slots(
                    workspace_id,
                    start_date,
                    end_date,
                    None,
                    None,
                    self.config().default_slot_minutes,
                )
                .await
            {
                Ok(n) => created += n,
                Err(e) => warn!(%workspace_id, error = %e, "slot generation skipped"),
            }
        }
        created
    }
}
