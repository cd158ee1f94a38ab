use crate::engine::error::EngineError;
use crate::limits::*;
use crate::model::{Ms, SeatSlots, SlotState, Span};
use ulid::Ulid;

/// Bounds and ordering checks every externally supplied span goes through.
pub(super) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.start >= span.end {
        return Err(EngineError::InvalidRange {
            start: span.start,
            end: span.end,
        });
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span too long"));
    }
    Ok(())
}

/// Reject a span that overlaps a slot someone could still claim: BOOKED,
/// or HELD with an unexpired hold. Expired holds and FROZEN slots do not
/// conflict. `exclude` skips the slot being re-checked against itself.
pub(super) fn check_no_conflict(
    seat: &SeatSlots,
    span: &Span,
    now: Ms,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    for slot in seat.overlapping(span) {
        if exclude == Some(slot.id) {
            continue;
        }
        let taken = match slot.state {
            SlotState::Booked => true,
            SlotState::Held { expires_at, .. } => expires_at > now,
            SlotState::Open | SlotState::Frozen => false,
        };
        if taken {
            return Err(EngineError::Conflict(slot.id));
        }
    }
    Ok(())
}
