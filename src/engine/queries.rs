//! Read-only availability queries. Point-in-time snapshots under per-seat
//! read locks; no query blocks a writer for longer than one seat scan.

use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::limits::{MAX_PAGE_LIMIT, MAX_QUERY_WINDOW_MS};
use crate::model::{CalendarSlot, Ms, Page, SlotInfo, Span, WorkspaceAvailability};

fn validate_window(window: &Span) -> Result<(), EngineError> {
    if window.start >= window.end {
        return Err(EngineError::InvalidRange {
            start: window.start,
            end: window.end,
        });
    }
    if window.duration_ms() > MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("query window too long"));
    }
    Ok(())
}

fn day_span(date: NaiveDate) -> Span {
    let start = date.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
    Span::new(start, start + 24 * 60 * 60 * 1000)
}

impl Engine {
    /// OPEN (or lapsed-hold) slots of one seat inside the window, ordered
    /// by start time.
    pub async fn open_slots_for_seat(
        &self,
        seat_id: Ulid,
        window: Span,
    ) -> Result<Vec<SlotInfo>, EngineError> {
        validate_window(&window)?;
        if !self.catalog.contains_seat(&seat_id) {
            return Err(EngineError::NotFound(seat_id));
        }
        let now = self.now();
        let code = self.catalog.seat_full_code(&seat_id).unwrap_or_default();
        Ok(self.scan_open(&seat_id, &window, now, &code).await)
    }

    /// Open slots across every active seat of a workspace. Stable order:
    /// seat code, then start time. Pagination applies after ordering.
    pub async fn open_slots_for_workspace(
        &self,
        workspace_id: Ulid,
        window: Span,
        page: Option<Page>,
    ) -> Result<Vec<SlotInfo>, EngineError> {
        validate_window(&window)?;
        if !self.catalog.workspace_is_active(&workspace_id) {
            return Err(EngineError::InvalidWorkspace(workspace_id));
        }
        let now = self.now();
        let mut out = Vec::new();
        for seat_id in self.catalog.active_seats(&workspace_id) {
            let code = self.catalog.seat_full_code(&seat_id).unwrap_or_default();
            out.extend(self.scan_open(&seat_id, &window, now, &code).await);
        }
        out.sort_by(|a, b| a.seat_code.cmp(&b.seat_code).then(a.start.cmp(&b.start)));
        if let Some(page) = page {
            let limit = page.limit.min(MAX_PAGE_LIMIT);
            out = out.into_iter().skip(page.offset).take(limit).collect();
        }
        Ok(out)
    }

    /// Open slots across every active workspace of a coworking.
    pub async fn open_slots_for_coworking(
        &self,
        coworking_id: Ulid,
        window: Span,
    ) -> Result<Vec<SlotInfo>, EngineError> {
        validate_window(&window)?;
        if !self.catalog.contains_coworking(&coworking_id) {
            return Err(EngineError::NotFound(coworking_id));
        }
        let mut out = Vec::new();
        for workspace_id in self.catalog.active_workspaces_of(&coworking_id) {
            out.extend(
                self.open_slots_for_workspace(workspace_id, window, None)
                    .await?,
            );
        }
        out.sort_by(|a, b| a.seat_code.cmp(&b.seat_code).then(a.start.cmp(&b.start)));
        Ok(out)
    }

    /// Per-workspace slot counts for one calendar day. Workspaces with no
    /// slots report 0% availability rather than dividing by zero.
    pub async fn availability_summary(
        &self,
        coworking_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<WorkspaceAvailability>, EngineError> {
        if !self.catalog.contains_coworking(&coworking_id) {
            return Err(EngineError::NotFound(coworking_id));
        }
        let window = day_span(date);
        let now = self.now();
        let mut out = Vec::new();
        for workspace_id in self.catalog.active_workspaces_of(&coworking_id) {
            let name = self
                .catalog
                .workspace(&workspace_id)
                .map(|w| w.name)
                .unwrap_or_default();
            let mut total = 0u64;
            let mut open = 0u64;
            for seat_id in self.catalog.active_seats(&workspace_id) {
                let Some(rs) = self.seat_slots(&seat_id) else {
                    continue;
                };
                let guard = rs.read().await;
                for slot in guard.overlapping(&window) {
                    total += 1;
                    if slot.is_available(now) {
                        open += 1;
                    }
                }
            }
            // Anything not open right now (live holds and frozen slots
            // included) counts as booked, so the two buckets sum to total.
            let booked = total - open;
            let availability_pct = if total == 0 {
                0.0
            } else {
                open as f64 / total as f64 * 100.0
            };
            out.push(WorkspaceAvailability {
                workspace_id,
                workspace_name: name,
                total_slots: total,
                open_slots: open,
                booked_slots: booked,
                availability_pct,
            });
        }
        Ok(out)
    }

    /// True when the slot is OPEN or its hold has lapsed.
    pub async fn is_slot_available(&self, slot_id: Ulid) -> Result<bool, EngineError> {
        let seat_id = self
            .seat_of_slot(&slot_id)
            .ok_or(EngineError::NotFound(slot_id))?;
        let rs = self
            .seat_slots(&seat_id)
            .ok_or(EngineError::NotFound(seat_id))?;
        let guard = rs.read().await;
        let slot = guard
            .find(slot_id)
            .ok_or(EngineError::NotFound(slot_id))?;
        Ok(slot.is_available(self.now()))
    }

    /// Every slot of a seat on one day, any state. Operator view.
    pub async fn slots_for_seat(
        &self,
        seat_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<CalendarSlot>, EngineError> {
        if !self.catalog.contains_seat(&seat_id) {
            return Err(EngineError::NotFound(seat_id));
        }
        let rs = self
            .seat_slots(&seat_id)
            .ok_or(EngineError::NotFound(seat_id))?;
        let window = day_span(date);
        let guard = rs.read().await;
        Ok(guard.overlapping(&window).cloned().collect())
    }

    /// BOOKED slots across all seats inside the window, ordered by start.
    pub async fn booked_slots_in_range(
        &self,
        window: Span,
    ) -> Result<Vec<SlotInfo>, EngineError> {
        validate_window(&window)?;
        let mut out = Vec::new();
        for seat_id in self.all_seat_ids() {
            let Some(rs) = self.seat_slots(&seat_id) else {
                continue;
            };
            let code = self.catalog.seat_full_code(&seat_id).unwrap_or_default();
            let guard = rs.read().await;
            for slot in guard.overlapping(&window) {
                if slot.is_booked() {
                    out.push(slot_info(slot, &code));
                }
            }
        }
        out.sort_by_key(|s| (s.start, s.seat_code.clone()));
        Ok(out)
    }

    async fn scan_open(
        &self,
        seat_id: &Ulid,
        window: &Span,
        now: Ms,
        seat_code: &str,
    ) -> Vec<SlotInfo> {
        let Some(rs) = self.seat_slots(seat_id) else {
            return Vec::new();
        };
        let guard = rs.read().await;
        guard
            .overlapping(window)
            .filter(|s| s.is_available(now))
            .map(|s| slot_info(s, seat_code))
            .collect()
    }
}

fn slot_info(slot: &CalendarSlot, seat_code: &str) -> SlotInfo {
    SlotInfo {
        slot_id: slot.id,
        seat_id: slot.seat_id,
        seat_code: seat_code.to_string(),
        start: slot.span.start,
        end: slot.span.end,
    }
}
