use chrono::NaiveTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only timestamp type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// Slot lifecycle state. The hold fields only exist while held, so a
/// BOOKED slot carrying a stale holder id is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotState {
    Open,
    Held { user_id: Ulid, expires_at: Ms },
    Booked,
    Frozen,
}

impl SlotState {
    pub fn name(&self) -> &'static str {
        match self {
            SlotState::Open => "OPEN",
            SlotState::Held { .. } => "HELD",
            SlotState::Booked => "BOOKED",
            SlotState::Frozen => "FROZEN",
        }
    }
}

/// The atomic reservable unit: one seat for one time interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarSlot {
    pub id: Ulid,
    pub seat_id: Ulid,
    pub span: Span,
    pub state: SlotState,
}

impl CalendarSlot {
    pub fn new(id: Ulid, seat_id: Ulid, span: Span) -> Self {
        Self {
            id,
            seat_id,
            span,
            state: SlotState::Open,
        }
    }

    /// Lazy expiry: an expired hold counts as available without any write.
    pub fn is_available(&self, now: Ms) -> bool {
        match self.state {
            SlotState::Open => true,
            SlotState::Held { expires_at, .. } => expires_at <= now,
            _ => false,
        }
    }

    /// Held with an unexpired hold.
    pub fn is_held(&self, now: Ms) -> bool {
        matches!(self.state, SlotState::Held { expires_at, .. } if expires_at > now)
    }

    pub fn is_held_by(&self, user: Ulid, now: Ms) -> bool {
        matches!(
            self.state,
            SlotState::Held { user_id, expires_at } if user_id == user && expires_at > now
        )
    }

    pub fn is_booked(&self) -> bool {
        self.state == SlotState::Booked
    }

    pub fn is_frozen(&self) -> bool {
        self.state == SlotState::Frozen
    }
}

/// Per-seat slot list, sorted by `span.start`. One of these lives behind a
/// write lock per seat; every slot transition happens under that lock.
#[derive(Debug, Clone)]
pub struct SeatSlots {
    pub seat_id: Ulid,
    pub slots: Vec<CalendarSlot>,
}

impl SeatSlots {
    pub fn new(seat_id: Ulid) -> Self {
        Self {
            seat_id,
            slots: Vec::new(),
        }
    }

    /// Insert keeping sort order by span.start.
    pub fn insert_slot(&mut self, slot: CalendarSlot) {
        let pos = self
            .slots
            .binary_search_by_key(&slot.span.start, |s| s.span.start)
            .unwrap_or_else(|e| e);
        self.slots.insert(pos, slot);
    }

    pub fn remove_slot(&mut self, id: Ulid) -> Option<CalendarSlot> {
        let pos = self.slots.iter().position(|s| s.id == id)?;
        Some(self.slots.remove(pos))
    }

    pub fn find(&self, id: Ulid) -> Option<&CalendarSlot> {
        self.slots.iter().find(|s| s.id == id)
    }

    pub fn find_mut(&mut self, id: Ulid) -> Option<&mut CalendarSlot> {
        self.slots.iter_mut().find(|s| s.id == id)
    }

    /// Exact (start, end) duplicate check — the per-seat uniqueness invariant.
    pub fn exists(&self, span: &Span) -> Option<Ulid> {
        let from = self.slots.partition_point(|s| s.span.start < span.start);
        self.slots[from..]
            .iter()
            .take_while(|s| s.span.start == span.start)
            .find(|s| s.span.end == span.end)
            .map(|s| s.id)
    }

    /// Slots whose span overlaps the query window, via binary search on the
    /// sorted start times.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &CalendarSlot> {
        let right = self.slots.partition_point(|s| s.span.start < query.end);
        self.slots[..right]
            .iter()
            .filter(move |s| s.span.end > query.start)
    }
}

/// Booking lifecycle. PENDING exists for external-payment flows; the
/// hold→book path records bookings directly as CONFIRMED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Canceled,
    NoShow,
}

impl BookingStatus {
    pub fn name(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Canceled => "CANCELED",
            BookingStatus::NoShow => "NO_SHOW",
        }
    }
}

/// A confirmed or historical reservation. Non-owning references to user,
/// seat and slot; the slot link is fixed at creation and survives
/// cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub user_id: Ulid,
    pub seat_id: Ulid,
    pub slot_id: Ulid,
    pub status: BookingStatus,
    pub total_price: Decimal,
    pub currency: String,
    pub created_at: Ms,
    pub confirmed_at: Option<Ms>,
    pub canceled_at: Option<Ms>,
    pub no_show_at: Option<Ms>,
    pub cancellation_reason: Option<String>,
}

impl Booking {
    pub fn can_be_canceled(&self) -> bool {
        matches!(self.status, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

/// The journal record format — flat, no nesting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    CoworkingCreated {
        coworking: crate::catalog::Coworking,
    },
    WorkspaceCreated {
        workspace: crate::catalog::Workspace,
    },
    SeatCreated {
        seat: crate::catalog::WorkspaceSeat,
    },
    CoworkingActiveSet {
        id: Ulid,
        active: bool,
    },
    WorkspaceActiveSet {
        id: Ulid,
        active: bool,
    },
    SeatActiveSet {
        id: Ulid,
        active: bool,
    },
    /// Bulk slot insertion for one seat. Generation emits these with all
    /// slots OPEN; compaction emits them with the current states.
    SlotsGenerated {
        seat_id: Ulid,
        slots: Vec<CalendarSlot>,
    },
    SlotDeleted {
        seat_id: Ulid,
        slot_id: Ulid,
    },
    HoldPlaced {
        seat_id: Ulid,
        slot_id: Ulid,
        user_id: Ulid,
        expires_at: Ms,
    },
    SlotReleased {
        seat_id: Ulid,
        slot_id: Ulid,
    },
    SlotFrozen {
        seat_id: Ulid,
        slot_id: Ulid,
    },
    SlotUnfrozen {
        seat_id: Ulid,
        slot_id: Ulid,
    },
    /// Bulk reclamation of expired holds on one seat.
    HoldsSwept {
        seat_id: Ulid,
        slot_ids: Vec<Ulid>,
    },
    /// Booking creation and the HELD→BOOKED flip are one record, so either
    /// both replay or neither does.
    BookingRecorded {
        booking: Booking,
    },
    BookingCanceled {
        booking_id: Ulid,
        seat_id: Ulid,
        slot_id: Ulid,
        at: Ms,
        reason: Option<String>,
    },
    BookingNoShow {
        booking_id: Ulid,
        at: Ms,
    },
}

// ── Query result types ───────────────────────────────────────────

/// One bookable slot as exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotInfo {
    pub slot_id: Ulid,
    pub seat_id: Ulid,
    pub seat_code: String,
    pub start: Ms,
    pub end: Ms,
}

/// Per-workspace availability snapshot for one date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkspaceAvailability {
    pub workspace_id: Ulid,
    pub workspace_name: String,
    pub total_slots: u64,
    pub open_slots: u64,
    pub booked_slots: u64,
    pub availability_pct: f64,
}

/// Offset/limit pagination with stable ordering decided by each query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

/// Daily operating window. Invariant: `open <= close`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn slot_availability_tracks_expiry() {
        let mut slot = CalendarSlot::new(Ulid::new(), Ulid::new(), Span::new(1000, 2000));
        assert!(slot.is_available(0));

        let user = Ulid::new();
        slot.state = SlotState::Held {
            user_id: user,
            expires_at: 500,
        };
        assert!(!slot.is_available(400));
        assert!(slot.is_held(400));
        assert!(slot.is_held_by(user, 400));
        // At and after expiry the slot reads as available again.
        assert!(slot.is_available(500));
        assert!(!slot.is_held(500));
        assert!(!slot.is_held_by(user, 500));
    }

    #[test]
    fn held_by_requires_matching_user() {
        let mut slot = CalendarSlot::new(Ulid::new(), Ulid::new(), Span::new(0, 100));
        slot.state = SlotState::Held {
            user_id: Ulid::new(),
            expires_at: 1000,
        };
        assert!(!slot.is_held_by(Ulid::new(), 0));
    }

    #[test]
    fn seat_slots_ordering() {
        let seat = Ulid::new();
        let mut ss = SeatSlots::new(seat);
        ss.insert_slot(CalendarSlot::new(Ulid::new(), seat, Span::new(300, 400)));
        ss.insert_slot(CalendarSlot::new(Ulid::new(), seat, Span::new(100, 200)));
        ss.insert_slot(CalendarSlot::new(Ulid::new(), seat, Span::new(200, 300)));
        assert_eq!(ss.slots[0].span.start, 100);
        assert_eq!(ss.slots[1].span.start, 200);
        assert_eq!(ss.slots[2].span.start, 300);
    }

    #[test]
    fn seat_slots_exists_exact_match_only() {
        let seat = Ulid::new();
        let mut ss = SeatSlots::new(seat);
        let id = Ulid::new();
        ss.insert_slot(CalendarSlot::new(id, seat, Span::new(100, 200)));
        assert_eq!(ss.exists(&Span::new(100, 200)), Some(id));
        assert_eq!(ss.exists(&Span::new(100, 300)), None);
        assert_eq!(ss.exists(&Span::new(150, 200)), None);
    }

    #[test]
    fn overlapping_skips_disjoint() {
        let seat = Ulid::new();
        let mut ss = SeatSlots::new(seat);
        ss.insert_slot(CalendarSlot::new(Ulid::new(), seat, Span::new(100, 200)));
        ss.insert_slot(CalendarSlot::new(Ulid::new(), seat, Span::new(450, 600)));
        ss.insert_slot(CalendarSlot::new(Ulid::new(), seat, Span::new(1000, 1100)));

        let hits: Vec<_> = ss.overlapping(&Span::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let seat = Ulid::new();
        let mut ss = SeatSlots::new(seat);
        ss.insert_slot(CalendarSlot::new(Ulid::new(), seat, Span::new(100, 200)));
        assert!(ss.overlapping(&Span::new(200, 300)).next().is_none());
    }

    #[test]
    fn remove_slot_preserves_order() {
        let seat = Ulid::new();
        let mut ss = SeatSlots::new(seat);
        let ids: Vec<Ulid> = (0..3).map(|_| Ulid::new()).collect();
        for (i, &id) in ids.iter().enumerate() {
            ss.insert_slot(CalendarSlot::new(
                id,
                seat,
                Span::new((i as Ms) * 100, (i as Ms) * 100 + 50),
            ));
        }
        ss.remove_slot(ids[1]);
        assert_eq!(ss.slots.len(), 2);
        assert_eq!(ss.slots[0].id, ids[0]);
        assert_eq!(ss.slots[1].id, ids[2]);
        assert!(ss.remove_slot(Ulid::new()).is_none());
    }

    #[test]
    fn booking_status_predicates() {
        use rust_decimal::Decimal;

        let mut b = Booking {
            id: Ulid::new(),
            user_id: Ulid::new(),
            seat_id: Ulid::new(),
            slot_id: Ulid::new(),
            status: BookingStatus::Confirmed,
            total_price: Decimal::ZERO,
            currency: "RUB".into(),
            created_at: 0,
            confirmed_at: Some(0),
            canceled_at: None,
            no_show_at: None,
            cancellation_reason: None,
        };
        assert!(b.can_be_canceled());
        assert!(b.is_active());
        b.status = BookingStatus::NoShow;
        assert!(!b.can_be_canceled());
        assert!(!b.is_active());
        b.status = BookingStatus::Pending;
        assert!(b.can_be_canceled());
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::HoldPlaced {
            seat_id: Ulid::new(),
            slot_id: Ulid::new(),
            user_id: Ulid::new(),
            expires_at: 1_700_000_000_000,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
