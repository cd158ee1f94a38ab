//! The booking ledger: confirm, cancel, no-show, and its read side.

use rust_decimal::Decimal;
use tracing::info;
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::limits::MAX_REASON_LEN;
use crate::model::{Booking, BookingStatus, Event, Ms, Page, Span};
use crate::observability::{BOOKINGS_CANCELED_TOTAL, BOOKINGS_CONFIRMED_TOTAL, NO_SHOWS_TOTAL};

/// Grace period after a slot ends before a confirmed booking shows up in
/// the potential no-show report.
const NO_SHOW_GRACE_MS: Ms = 30 * 60 * 1000;

/// Who is canceling. Admins skip both the ownership check and the
/// cancellation deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanceledBy {
    User(Ulid),
    Admin,
}

impl CanceledBy {
    fn label(&self) -> &'static str {
        match self {
            CanceledBy::User(_) => "user",
            CanceledBy::Admin => "admin",
        }
    }
}

impl Engine {
    /// Convert the caller's unexpired hold into a CONFIRMED booking. With
    /// no explicit price, the workspace hourly rate prorated by slot
    /// duration applies. The booking record and the HELD→BOOKED flip are a
    /// single journal event.
    pub async fn confirm_booking(
        &self,
        user_id: Ulid,
        slot_id: Ulid,
        price: Option<Decimal>,
    ) -> Result<Booking, EngineError> {
        if price.is_some_and(|p| p.is_sign_negative()) {
            return Err(EngineError::LimitExceeded("negative price"));
        }
        let now = self.now();
        let (seat_id, mut guard) = self.resolve_slot_write(&slot_id).await?;
        let slot = guard
            .find(slot_id)
            .ok_or(EngineError::NotFound(slot_id))?;
        if !slot.is_held_by(user_id, now) {
            return Err(EngineError::NotHeldByUser(slot_id));
        }

        let seat = self
            .catalog
            .seat(&seat_id)
            .ok_or(EngineError::NotFound(seat_id))?;
        // The seat may have been retired while the hold was pending.
        if !self.catalog.seat_is_active(&seat_id) {
            return Err(EngineError::InvalidWorkspace(seat.workspace_id));
        }
        let workspace = self
            .catalog
            .workspace(&seat.workspace_id)
            .ok_or(EngineError::NotFound(seat.workspace_id))?;
        let total_price = price.unwrap_or_else(|| prorate(workspace.price_per_hour, slot.span));

        let booking = Booking {
            id: Ulid::new(),
            user_id,
            seat_id,
            slot_id,
            status: BookingStatus::Confirmed,
            total_price,
            currency: self.config().currency.clone(),
            created_at: now,
            confirmed_at: Some(now),
            canceled_at: None,
            no_show_at: None,
            cancellation_reason: None,
        };
        let event = Event::BookingRecorded {
            booking: booking.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        drop(guard);

        metrics::counter!(BOOKINGS_CONFIRMED_TOTAL).increment(1);
        info!(booking_id = %booking.id, %slot_id, %user_id, "booking confirmed");
        let code = self
            .catalog
            .seat_full_code(&seat_id)
            .unwrap_or_else(|| seat.code.clone());
        self.notifier.booking_confirmed(&booking, &code);
        Ok(booking)
    }

    /// Cancel a PENDING or CONFIRMED booking; the slot returns to OPEN.
    /// User cancellations must happen before `slot.start - cancellation
    /// window` and only by the booking's owner.
    pub async fn cancel_booking(
        &self,
        booking_id: Ulid,
        canceled_by: CanceledBy,
        reason: Option<String>,
    ) -> Result<Booking, EngineError> {
        if reason.as_ref().is_some_and(|r| r.len() > MAX_REASON_LEN) {
            return Err(EngineError::LimitExceeded("cancellation reason length"));
        }
        let now = self.now();
        let stale = self
            .booking_snapshot(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;

        let (seat_id, mut guard) = self.resolve_slot_write(&stale.slot_id).await?;
        // Re-read under the lock; a concurrent cancel may have won.
        let booking = self
            .booking_snapshot(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        if !booking.can_be_canceled() {
            return Err(EngineError::IllegalBookingTransition {
                booking_id,
                status: booking.status.name(),
                op: "cancel",
            });
        }
        if let CanceledBy::User(user_id) = canceled_by {
            if user_id != booking.user_id {
                return Err(EngineError::NotAuthorized(booking_id));
            }
            let slot = guard
                .find(booking.slot_id)
                .ok_or(EngineError::NotFound(booking.slot_id))?;
            let deadline = slot.span.start - self.config().cancellation_window_ms;
            if now >= deadline {
                return Err(EngineError::TooLateToCancel { deadline });
            }
        }

        let event = Event::BookingCanceled {
            booking_id,
            seat_id,
            slot_id: booking.slot_id,
            at: now,
            reason,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        drop(guard);

        let canceled = self
            .booking_snapshot(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        metrics::counter!(BOOKINGS_CANCELED_TOTAL, "by" => canceled_by.label()).increment(1);
        info!(%booking_id, by = canceled_by.label(), "booking canceled");
        if let Some(code) = self.catalog.seat_full_code(&seat_id) {
            self.notifier.booking_canceled(&canceled, &code);
        }
        Ok(canceled)
    }

    /// Record that a confirmed guest never arrived. Only valid after the
    /// slot has started; the slot itself stays BOOKED.
    pub async fn mark_no_show(&self, booking_id: Ulid) -> Result<Booking, EngineError> {
        let now = self.now();
        let stale = self
            .booking_snapshot(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;

        let (_, mut guard) = self.resolve_slot_write(&stale.slot_id).await?;
        // Re-read under the lock; a concurrent cancel may have won.
        let booking = self
            .booking_snapshot(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        if booking.status != BookingStatus::Confirmed {
            return Err(EngineError::IllegalBookingTransition {
                booking_id,
                status: booking.status.name(),
                op: "mark no-show",
            });
        }
        let span = guard
            .find(booking.slot_id)
            .map(|s| s.span)
            .ok_or(EngineError::NotFound(booking.slot_id))?;
        if now <= span.start {
            return Err(EngineError::TooEarlyForNoShow {
                starts_at: span.start,
            });
        }

        let event = Event::BookingNoShow {
            booking_id,
            at: now,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        drop(guard);

        metrics::counter!(NO_SHOWS_TOTAL).increment(1);
        info!(%booking_id, "booking marked no-show");
        self.booking_snapshot(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))
    }

    // ── Read side ────────────────────────────────────────────

    /// A user's bookings, newest first.
    pub fn user_bookings(&self, user_id: Ulid, page: Option<Page>) -> Vec<Booking> {
        let mut out: Vec<Booking> = self
            .bookings_of_user(&user_id)
            .iter()
            .filter_map(|id| self.booking_snapshot(id))
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        if let Some(page) = page {
            out = out.into_iter().skip(page.offset).take(page.limit).collect();
        }
        out
    }

    /// Fetch a booking; with `requester` set, only its owner may see it.
    pub fn get_booking(
        &self,
        booking_id: Ulid,
        requester: Option<Ulid>,
    ) -> Result<Booking, EngineError> {
        let booking = self
            .booking_snapshot(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        if requester.is_some_and(|u| u != booking.user_id) {
            return Err(EngineError::NotAuthorized(booking_id));
        }
        Ok(booking)
    }

    /// Bookings whose slot overlaps the window, any status.
    pub async fn bookings_in_range(&self, window: Span) -> Vec<Booking> {
        let mut out = Vec::new();
        for booking in self.all_bookings() {
            if let Some(span) = self.booking_slot_span(&booking).await
                && span.overlaps(&window)
            {
                out.push(booking);
            }
        }
        out.sort_by_key(|b| b.created_at);
        out
    }

    /// CONFIRMED bookings whose slot ended over thirty minutes ago — the
    /// candidates an operator reviews before marking no-shows.
    pub async fn potential_no_shows(&self) -> Vec<Booking> {
        let now = self.now();
        let mut out = Vec::new();
        for booking in self.all_bookings() {
            if booking.status != BookingStatus::Confirmed {
                continue;
            }
            if let Some(span) = self.booking_slot_span(&booking).await
                && span.end + NO_SHOW_GRACE_MS < now
            {
                out.push(booking);
            }
        }
        out.sort_by_key(|b| b.created_at);
        out
    }

    /// What a booking of this slot would cost right now.
    pub async fn quote_price(&self, slot_id: Ulid) -> Result<Decimal, EngineError> {
        let seat_id = self
            .seat_of_slot(&slot_id)
            .ok_or(EngineError::NotFound(slot_id))?;
        let seat = self
            .catalog
            .seat(&seat_id)
            .ok_or(EngineError::NotFound(seat_id))?;
        let workspace = self
            .catalog
            .workspace(&seat.workspace_id)
            .ok_or(EngineError::NotFound(seat.workspace_id))?;
        let rs = self
            .seat_slots(&seat_id)
            .ok_or(EngineError::NotFound(seat_id))?;
        let guard = rs.read().await;
        let slot = guard
            .find(slot_id)
            .ok_or(EngineError::NotFound(slot_id))?;
        Ok(prorate(workspace.price_per_hour, slot.span))
    }

    /// Sum of billable (CONFIRMED and NO_SHOW) booking prices over slots
    /// overlapping the window. No-shows still pay.
    pub async fn total_revenue(&self, window: Span) -> Decimal {
        let mut total = Decimal::ZERO;
        for booking in self.bookings_in_range(window).await {
            if matches!(
                booking.status,
                BookingStatus::Confirmed | BookingStatus::NoShow
            ) {
                total += booking.total_price;
            }
        }
        total
    }

    async fn booking_slot_span(&self, booking: &Booking) -> Option<Span> {
        let rs = self.seat_slots(&booking.seat_id)?;
        let guard = rs.read().await;
        guard.find(booking.slot_id).map(|s| s.span)
    }
}

/// `price_per_hour × duration`, kept exact in `Decimal`.
fn prorate(price_per_hour: Decimal, span: Span) -> Decimal {
    price_per_hour * Decimal::from(span.duration_ms()) / Decimal::from(3_600_000_i64)
}
