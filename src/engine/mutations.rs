//! Catalog writes and slot state transitions.

use chrono::NaiveTime;
use rust_decimal::Decimal;
use tracing::{debug, info};
use ulid::Ulid;

use crate::catalog::{Coworking, Workspace, WorkspaceSeat};
use crate::engine::{conflict, Engine, EngineError};
use crate::limits::{MAX_NAME_LEN, MAX_SEAT_CODE_LEN, MAX_SLOTS_PER_SEAT};
use crate::model::{CalendarSlot, Event, Ms, OpenHours, SlotState, Span};
use crate::observability::{HOLDS_PLACED_TOTAL, HOLDS_REJECTED_TOTAL};

fn validate_name(name: &str) -> Result<(), EngineError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name length"));
    }
    Ok(())
}

impl Engine {
    // ── Catalog writes ───────────────────────────────────────

    pub async fn create_coworking(
        &self,
        name: String,
        address: String,
        timezone: String,
        open_from: NaiveTime,
        open_to: NaiveTime,
    ) -> Result<Coworking, EngineError> {
        validate_name(&name)?;
        if open_from >= open_to {
            return Err(EngineError::LimitExceeded("open hours reversed"));
        }
        let coworking = Coworking {
            id: Ulid::new(),
            name,
            address,
            timezone,
            open_from,
            open_to,
            active: true,
        };
        let event = Event::CoworkingCreated {
            coworking: coworking.clone(),
        };
        self.journal_append(&event).await?;
        self.apply_event(None, &event);
        info!(coworking_id = %coworking.id, name = %coworking.name, "coworking created");
        Ok(coworking)
    }

    pub async fn create_workspace(
        &self,
        coworking_id: Ulid,
        name: String,
        seats_total: u32,
        price_per_hour: Decimal,
        open_override: Option<OpenHours>,
    ) -> Result<Workspace, EngineError> {
        validate_name(&name)?;
        if !self.catalog.contains_coworking(&coworking_id) {
            return Err(EngineError::NotFound(coworking_id));
        }
        if let Some(hours) = &open_override
            && hours.open >= hours.close
        {
            return Err(EngineError::LimitExceeded("open hours reversed"));
        }
        if price_per_hour.is_sign_negative() {
            return Err(EngineError::LimitExceeded("negative price"));
        }
        let workspace = Workspace {
            id: Ulid::new(),
            coworking_id,
            name,
            seats_total,
            price_per_hour,
            active: true,
            open_override,
        };
        let event = Event::WorkspaceCreated {
            workspace: workspace.clone(),
        };
        self.journal_append(&event).await?;
        self.apply_event(None, &event);
        info!(workspace_id = %workspace.id, name = %workspace.name, "workspace created");
        Ok(workspace)
    }

    /// Seat codes are unique within their workspace.
    pub async fn create_seat(
        &self,
        workspace_id: Ulid,
        code: String,
    ) -> Result<WorkspaceSeat, EngineError> {
        if code.is_empty() || code.len() > MAX_SEAT_CODE_LEN {
            return Err(EngineError::LimitExceeded("seat code length"));
        }
        if !self.catalog.contains_workspace(&workspace_id) {
            return Err(EngineError::NotFound(workspace_id));
        }
        for sibling in self.catalog.seats_of(&workspace_id) {
            if self.catalog.seat_code(&sibling).as_deref() == Some(code.as_str()) {
                return Err(EngineError::AlreadyExists(sibling));
            }
        }
        let seat = WorkspaceSeat {
            id: Ulid::new(),
            workspace_id,
            code,
            active: true,
        };
        let event = Event::SeatCreated { seat: seat.clone() };
        self.journal_append(&event).await?;
        self.apply_event(None, &event);
        info!(seat_id = %seat.id, code = %seat.code, "seat created");
        Ok(seat)
    }

    pub async fn set_coworking_active(&self, id: Ulid, active: bool) -> Result<(), EngineError> {
        if !self.catalog.contains_coworking(&id) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::CoworkingActiveSet { id, active };
        self.journal_append(&event).await?;
        self.apply_event(None, &event);
        Ok(())
    }

    pub async fn set_workspace_active(&self, id: Ulid, active: bool) -> Result<(), EngineError> {
        if !self.catalog.contains_workspace(&id) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::WorkspaceActiveSet { id, active };
        self.journal_append(&event).await?;
        self.apply_event(None, &event);
        Ok(())
    }

    pub async fn set_seat_active(&self, id: Ulid, active: bool) -> Result<(), EngineError> {
        if !self.catalog.contains_seat(&id) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::SeatActiveSet { id, active };
        self.journal_append(&event).await?;
        self.apply_event(None, &event);
        Ok(())
    }

    // ── Slot transitions ─────────────────────────────────────

    /// Place a hold: compare-and-set under the seat's write lock. Succeeds
    /// on an OPEN slot or one whose previous hold has lapsed. Returns the
    /// hold's expiry instant.
    pub async fn hold_slot(&self, user_id: Ulid, slot_id: Ulid) -> Result<Ms, EngineError> {
        let now = self.now();

        // The gate serializes this user's placements, making the budget
        // check exact even across seats; the CAS below is what actually
        // guarantees single-holder.
        let gate = self.hold_gate(user_id);
        let _placing = gate.lock().await;
        if self.count_active_holds(user_id, now).await >= self.config().max_holds_per_user {
            let err = EngineError::TooManyHolds {
                limit: self.config().max_holds_per_user,
            };
            metrics::counter!(HOLDS_REJECTED_TOTAL, "kind" => err.kind().label()).increment(1);
            return Err(err);
        }

        let (seat_id, mut guard) = self.resolve_slot_write(&slot_id).await?;
        let slot = guard
            .find(slot_id)
            .ok_or(EngineError::NotFound(slot_id))?;
        if !slot.is_available(now) {
            metrics::counter!(HOLDS_REJECTED_TOTAL, "kind" => "unavailable").increment(1);
            return Err(EngineError::SlotUnavailable(slot_id));
        }

        let expires_at = now + self.config().hold_ttl_ms;
        let event = Event::HoldPlaced {
            seat_id,
            slot_id,
            user_id,
            expires_at,
        };
        self.persist_and_apply(&mut guard, &event).await?;

        metrics::counter!(HOLDS_PLACED_TOTAL).increment(1);
        debug!(%slot_id, %user_id, expires_at, "hold placed");
        Ok(expires_at)
    }

    /// Voluntary release by the current holder.
    pub async fn release_slot(&self, user_id: Ulid, slot_id: Ulid) -> Result<(), EngineError> {
        let now = self.now();
        let (seat_id, mut guard) = self.resolve_slot_write(&slot_id).await?;
        let slot = guard
            .find(slot_id)
            .ok_or(EngineError::NotFound(slot_id))?;
        if !slot.is_held_by(user_id, now) {
            return Err(EngineError::NotHeldByUser(slot_id));
        }
        let event = Event::SlotReleased { seat_id, slot_id };
        self.persist_and_apply(&mut guard, &event).await?;
        debug!(%slot_id, %user_id, "hold released");
        Ok(())
    }

    /// Administrative freeze. Allowed from OPEN or HELD (the hold is
    /// discarded), never from BOOKED.
    pub async fn freeze_slot(&self, slot_id: Ulid) -> Result<(), EngineError> {
        let (seat_id, mut guard) = self.resolve_slot_write(&slot_id).await?;
        let slot = guard
            .find(slot_id)
            .ok_or(EngineError::NotFound(slot_id))?;
        match slot.state {
            SlotState::Booked => {
                return Err(EngineError::IllegalTransition {
                    slot_id,
                    state: slot.state.name(),
                    op: "freeze",
                })
            }
            SlotState::Frozen => return Ok(()), // idempotent
            SlotState::Open | SlotState::Held { .. } => {}
        }
        let event = Event::SlotFrozen { seat_id, slot_id };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(%slot_id, "slot frozen");
        Ok(())
    }

    /// FROZEN → OPEN. Any other state is an illegal transition.
    pub async fn unfreeze_slot(&self, slot_id: Ulid) -> Result<(), EngineError> {
        let (seat_id, mut guard) = self.resolve_slot_write(&slot_id).await?;
        let slot = guard
            .find(slot_id)
            .ok_or(EngineError::NotFound(slot_id))?;
        if !slot.is_frozen() {
            return Err(EngineError::IllegalTransition {
                slot_id,
                state: slot.state.name(),
                op: "unfreeze",
            });
        }
        let event = Event::SlotUnfrozen { seat_id, slot_id };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(%slot_id, "slot unfrozen");
        Ok(())
    }

    /// Manually add one slot to a seat, outside the generation grid.
    pub async fn create_slot(&self, seat_id: Ulid, span: Span) -> Result<Ulid, EngineError> {
        conflict::validate_span(&span)?;
        if !self.catalog.contains_seat(&seat_id) {
            return Err(EngineError::NotFound(seat_id));
        }
        let rs = self
            .seat_slots(&seat_id)
            .ok_or(EngineError::NotFound(seat_id))?;
        let mut guard = rs.write_owned().await;

        if let Some(existing) = guard.exists(&span) {
            return Err(EngineError::AlreadyExists(existing));
        }
        conflict::check_no_conflict(&guard, &span, self.now(), None)?;
        if guard.slots.len() >= MAX_SLOTS_PER_SEAT {
            return Err(EngineError::LimitExceeded("too many slots for seat"));
        }

        let slot = CalendarSlot::new(Ulid::new(), seat_id, span);
        let slot_id = slot.id;
        let event = Event::SlotsGenerated {
            seat_id,
            slots: vec![slot],
        };
        self.persist_and_apply(&mut guard, &event).await?;
        debug!(%seat_id, %slot_id, "slot created");
        Ok(slot_id)
    }

    /// Remove a slot nobody can still claim: OPEN, FROZEN, or carrying an
    /// expired hold. BOOKED and actively held slots stay.
    pub async fn delete_slot(&self, slot_id: Ulid) -> Result<(), EngineError> {
        let now = self.now();
        let (seat_id, mut guard) = self.resolve_slot_write(&slot_id).await?;
        let slot = guard
            .find(slot_id)
            .ok_or(EngineError::NotFound(slot_id))?;
        if slot.is_booked() || slot.is_held(now) {
            return Err(EngineError::IllegalTransition {
                slot_id,
                state: slot.state.name(),
                op: "delete",
            });
        }
        let event = Event::SlotDeleted { seat_id, slot_id };
        self.persist_and_apply(&mut guard, &event).await?;
        debug!(%slot_id, "slot deleted");
        Ok(())
    }
}
