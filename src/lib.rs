//! seatgrid — an embeddable reservation engine for coworking seats.
//!
//! Slots are materialized time intervals per seat; each moves through
//! OPEN → HELD → BOOKED (or FROZEN) under a per-seat lock, with holds
//! expiring lazily. Every state change is journaled before it is applied,
//! so an engine restarted over the same journal file reconstructs the
//! exact catalog, calendar and booking ledger.

pub mod catalog;
pub mod clock;
pub mod config;
pub mod engine;
pub mod journal;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod sweeper;

pub use catalog::{Catalog, Coworking, Workspace, WorkspaceSeat};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{CanceledBy, Engine, EngineError, ErrorKind};
pub use model::{
    Booking, BookingStatus, CalendarSlot, Event, Ms, OpenHours, Page, SlotInfo, SlotState, Span,
    WorkspaceAvailability,
};
pub use notify::{LogSink, NotificationSink, Notifier};
