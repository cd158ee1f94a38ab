use ulid::Ulid;

use crate::model::Ms;

/// Coarse error taxonomy. Doubles as the metrics/status label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    CapacityExceeded,
    PolicyViolation,
    Conflict,
    Validation,
    Storage,
}

impl ErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::CapacityExceeded => "capacity_exceeded",
            ErrorKind::PolicyViolation => "policy_violation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Validation => "validation",
            ErrorKind::Storage => "storage",
        }
    }
}

/// Every recoverable failure the engine can hand back to a caller.
/// Journal errors are the only storage-class failures; they are surfaced
/// opaquely and never retried here.
#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Slot is not OPEN and its hold (if any) has not expired.
    SlotUnavailable(Ulid),
    /// Caller is not the current unexpired holder.
    NotHeldByUser(Ulid),
    IllegalTransition {
        slot_id: Ulid,
        state: &'static str,
        op: &'static str,
    },
    IllegalBookingTransition {
        booking_id: Ulid,
        status: &'static str,
        op: &'static str,
    },
    TooManyHolds {
        limit: usize,
    },
    /// Workspace absent or inactive.
    InvalidWorkspace(Ulid),
    NoActiveSeats(Ulid),
    NotAuthorized(Ulid),
    TooLateToCancel {
        deadline: Ms,
    },
    /// No-show can only be recorded after the slot has started.
    TooEarlyForNoShow {
        starts_at: Ms,
    },
    /// Overlaps a held or booked slot on the same seat.
    Conflict(Ulid),
    InvalidRange {
        start: Ms,
        end: Ms,
    },
    InvalidDuration(i64),
    LimitExceeded(&'static str),
    JournalError(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::AlreadyExists(_) | EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::SlotUnavailable(_)
            | EngineError::NotHeldByUser(_)
            | EngineError::IllegalTransition { .. }
            | EngineError::IllegalBookingTransition { .. }
            | EngineError::InvalidWorkspace(_)
            | EngineError::NotAuthorized(_) => ErrorKind::InvalidState,
            EngineError::TooManyHolds { .. } | EngineError::NoActiveSeats(_) => {
                ErrorKind::CapacityExceeded
            }
            EngineError::TooLateToCancel { .. } | EngineError::TooEarlyForNoShow { .. } => {
                ErrorKind::PolicyViolation
            }
            EngineError::InvalidRange { .. }
            | EngineError::InvalidDuration(_)
            | EngineError::LimitExceeded(_) => ErrorKind::Validation,
            EngineError::JournalError(_) => ErrorKind::Storage,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::SlotUnavailable(id) => {
                write!(f, "slot {id} is not available for holding")
            }
            EngineError::NotHeldByUser(id) => write!(f, "slot {id} is not held by this user"),
            EngineError::IllegalTransition { slot_id, state, op } => {
                write!(f, "cannot {op} slot {slot_id} in state {state}")
            }
            EngineError::IllegalBookingTransition {
                booking_id,
                status,
                op,
            } => write!(f, "cannot {op} booking {booking_id} in status {status}"),
            EngineError::TooManyHolds { limit } => {
                write!(f, "user already has {limit} active holds")
            }
            EngineError::InvalidWorkspace(id) => {
                write!(f, "workspace {id} not found or inactive")
            }
            EngineError::NoActiveSeats(id) => {
                write!(f, "workspace {id} has no active seats")
            }
            EngineError::NotAuthorized(id) => {
                write!(f, "user is not authorized to act on booking {id}")
            }
            EngineError::TooLateToCancel { deadline } => {
                write!(f, "cancellation deadline passed at {deadline}")
            }
            EngineError::TooEarlyForNoShow { starts_at } => {
                write!(f, "slot has not started yet (starts at {starts_at})")
            }
            EngineError::Conflict(id) => write!(f, "conflicts with active slot {id}"),
            EngineError::InvalidRange { start, end } => {
                write!(f, "invalid time range [{start}, {end})")
            }
            EngineError::InvalidDuration(min) => {
                write!(f, "invalid slot duration: {min} minutes")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::JournalError(e) => write!(f, "journal error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_taxonomy() {
        let id = Ulid::new();
        assert_eq!(EngineError::NotFound(id).kind(), ErrorKind::NotFound);
        assert_eq!(
            EngineError::SlotUnavailable(id).kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            EngineError::TooManyHolds { limit: 3 }.kind(),
            ErrorKind::CapacityExceeded
        );
        assert_eq!(
            EngineError::TooLateToCancel { deadline: 0 }.kind(),
            ErrorKind::PolicyViolation
        );
        assert_eq!(EngineError::Conflict(id).kind(), ErrorKind::Conflict);
        assert_eq!(
            EngineError::InvalidRange { start: 5, end: 5 }.kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            EngineError::JournalError("disk gone".into()).kind(),
            ErrorKind::Storage
        );
    }
}
