mod conflict;
mod error;
mod generator;
mod ledger;
mod mutations;
mod queries;

pub use error::{EngineError, ErrorKind};
pub use ledger::CanceledBy;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use ulid::Ulid;

use crate::catalog::Catalog;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::journal::Journal;
use crate::model::*;
use crate::notify::{LogSink, NotificationSink, Notifier};

pub type SharedSeatSlots = Arc<RwLock<SeatSlots>>;

// ── Group-commit journal channel ─────────────────────────

pub(super) enum JournalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the journal and batches appends for group
/// commit: block for the first append, drain whatever else is immediately
/// queued, flush and fsync once, then acknowledge the whole batch.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            JournalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                loop {
                    match rx.try_recv() {
                        Ok(JournalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush the batch before the non-append command.
                            commit_batch(&mut journal, &mut batch);
                            handle_non_append(&mut journal, other);
                            break;
                        }
                        Err(_) => break, // channel empty
                    }
                }

                if !batch.is_empty() {
                    commit_batch(&mut journal, &mut batch);
                }
            }
            other => handle_non_append(&mut journal, other),
        }
    }
}

fn commit_batch(
    journal: &mut Journal,
    batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>,
) {
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE)
        .record(batch.len() as f64);
    let flush_start = std::time::Instant::now();

    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = journal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even on append error so partially buffered bytes don't leak
    // into the next batch (these callers are told the batch failed).
    let flush_err = journal.flush_sync().err();
    let result = match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    };

    metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Journal::write_compact_file(journal.path(), &events)
                .and_then(|()| journal.swap_compact_file());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_compact());
        }
        JournalCommand::Append { .. } => unreachable!(),
    }
}

/// The reservation engine: seat catalog, per-seat slot state, booking
/// ledger and the journal feeding all of them. One instance owns one
/// journal file.
pub struct Engine {
    pub catalog: Catalog,
    seats: DashMap<Ulid, SharedSeatSlots>,
    /// Reverse lookup: slot id → seat id.
    slot_to_seat: DashMap<Ulid, Ulid>,
    bookings: DashMap<Ulid, Booking>,
    bookings_by_user: DashMap<Ulid, Vec<Ulid>>,
    /// Slot ids a user currently holds. May contain expired entries;
    /// counters re-check expiry against the slot itself.
    holds_by_user: DashMap<Ulid, Vec<Ulid>>,
    /// Per-user mutex serializing hold placement, so the budget check and
    /// the hold it admits cannot interleave with the same user's other
    /// placements. Acquired before any seat lock, never the other way.
    hold_gates: DashMap<Ulid, Arc<Mutex<()>>>,
    journal_tx: mpsc::Sender<JournalCommand>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) notifier: Notifier,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        journal_path: PathBuf,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn NotificationSink>,
    ) -> io::Result<Self> {
        let events = Journal::replay(&journal_path)?;
        let journal = Journal::open(&journal_path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let engine = Self {
            catalog: Catalog::new(),
            seats: DashMap::new(),
            slot_to_seat: DashMap::new(),
            bookings: DashMap::new(),
            bookings_by_user: DashMap::new(),
            holds_by_user: DashMap::new(),
            hold_gates: DashMap::new(),
            journal_tx,
            clock,
            notifier: Notifier::new(sink),
            config,
        };

        // Replay — the engine is the sole owner of these Arcs, so try_write
        // always succeeds. Never block_on here: replay may run inside an
        // async context.
        for event in &events {
            match event_seat_id(event) {
                Some(seat_id) => {
                    if let Some(entry) = engine.seats.get(&seat_id) {
                        let rs = entry.value().clone();
                        drop(entry);
                        let mut guard = rs.try_write().expect("replay: uncontended write");
                        engine.apply_event(Some(&mut guard), event);
                    }
                }
                None => engine.apply_event(None, event),
            }
        }

        Ok(engine)
    }

    /// Engine with wall clock, log-only notifications and default policy.
    pub fn open(journal_path: PathBuf) -> io::Result<Self> {
        Self::new(
            journal_path,
            EngineConfig::default(),
            Arc::new(SystemClock),
            Arc::new(LogSink),
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> Ms {
        self.clock.now_ms()
    }

    /// Write an event through the background group-commit writer.
    pub(super) async fn journal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::JournalError(e.to_string()))
    }

    /// Journal-append + in-memory apply, the write-ahead pair every
    /// mutation goes through. The caller holds the seat's write lock.
    pub(super) async fn persist_and_apply(
        &self,
        guard: &mut SeatSlots,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.journal_append(event).await?;
        self.apply_event(Some(guard), event);
        Ok(())
    }

    pub(super) fn seat_slots(&self, seat_id: &Ulid) -> Option<SharedSeatSlots> {
        self.seats.get(seat_id).map(|e| e.value().clone())
    }

    pub fn seat_of_slot(&self, slot_id: &Ulid) -> Option<Ulid> {
        self.slot_to_seat.get(slot_id).map(|e| *e.value())
    }

    pub(super) fn booking_snapshot(&self, id: &Ulid) -> Option<Booking> {
        self.bookings.get(id).map(|e| e.value().clone())
    }

    pub(super) fn bookings_of_user(&self, user_id: &Ulid) -> Vec<Ulid> {
        self.bookings_by_user
            .get(user_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub(super) fn all_bookings(&self) -> Vec<Booking> {
        self.bookings.iter().map(|e| e.value().clone()).collect()
    }

    /// Lookup slot → seat, fetch the seat state, take its write lock.
    pub(super) async fn resolve_slot_write(
        &self,
        slot_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<SeatSlots>), EngineError> {
        let seat_id = self
            .seat_of_slot(slot_id)
            .ok_or(EngineError::NotFound(*slot_id))?;
        let rs = self
            .seat_slots(&seat_id)
            .ok_or(EngineError::NotFound(seat_id))?;
        Ok((seat_id, rs.write_owned().await))
    }

    /// Non-expired holds a user has across all seats. Called before taking
    /// the target seat's write lock; the limit is policy, not the CAS.
    // Clone the Arc out so no DashMap shard guard lives across an await.
    pub(super) fn hold_gate(&self, user_id: Ulid) -> Arc<Mutex<()>> {
        self.hold_gates.entry(user_id).or_default().clone()
    }

    pub(super) async fn count_active_holds(&self, user_id: Ulid, now: Ms) -> usize {
        let slot_ids = self
            .holds_by_user
            .get(&user_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let mut count = 0;
        for slot_id in slot_ids {
            let Some(seat_id) = self.seat_of_slot(&slot_id) else {
                continue;
            };
            let Some(rs) = self.seat_slots(&seat_id) else {
                continue;
            };
            let guard = rs.read().await;
            if guard.find(slot_id).is_some_and(|s| s.is_held_by(user_id, now)) {
                count += 1;
            }
        }
        count
    }

    pub(super) fn all_seat_ids(&self) -> Vec<Ulid> {
        self.seats.iter().map(|e| *e.key()).collect()
    }

    fn index_hold(&self, user_id: Ulid, slot_id: Ulid) {
        let mut held = self.holds_by_user.entry(user_id).or_default();
        if !held.contains(&slot_id) {
            held.push(slot_id);
        }
    }

    fn unindex_hold(&self, user_id: Ulid, slot_id: Ulid) {
        if let Some(mut held) = self.holds_by_user.get_mut(&user_id) {
            held.retain(|s| *s != slot_id);
        }
    }

    /// Drop a slot's hold index entry if it is currently held.
    fn unindex_if_held(&self, slot: &CalendarSlot) {
        if let SlotState::Held { user_id, .. } = slot.state {
            self.unindex_hold(user_id, slot.id);
        }
    }

    /// Apply one event to in-memory state. `guard` is the owning seat's
    /// locked state for seat-scoped events, None otherwise. No journal
    /// I/O here — this is the replay/apply half of write-ahead.
    fn apply_event(&self, guard: Option<&mut SeatSlots>, event: &Event) {
        match event {
            Event::CoworkingCreated { .. }
            | Event::WorkspaceCreated { .. }
            | Event::CoworkingActiveSet { .. }
            | Event::WorkspaceActiveSet { .. }
            | Event::SeatActiveSet { .. } => self.catalog.apply_event(event),
            Event::SeatCreated { seat } => {
                self.catalog.apply_event(event);
                self.seats
                    .entry(seat.id)
                    .or_insert_with(|| Arc::new(RwLock::new(SeatSlots::new(seat.id))));
            }
            Event::SlotsGenerated { seat_id, slots } => {
                let ss = guard.expect("seat guard required");
                for slot in slots {
                    self.slot_to_seat.insert(slot.id, *seat_id);
                    if let SlotState::Held { user_id, .. } = slot.state {
                        self.index_hold(user_id, slot.id);
                    }
                    ss.insert_slot(slot.clone());
                }
            }
            Event::SlotDeleted { slot_id, .. } => {
                let ss = guard.expect("seat guard required");
                if let Some(slot) = ss.remove_slot(*slot_id) {
                    self.unindex_if_held(&slot);
                }
                self.slot_to_seat.remove(slot_id);
            }
            Event::HoldPlaced {
                slot_id,
                user_id,
                expires_at,
                ..
            } => {
                let ss = guard.expect("seat guard required");
                if let Some(slot) = ss.find_mut(*slot_id) {
                    // An expired hold may be getting replaced.
                    if let SlotState::Held { user_id: prev, .. } = slot.state {
                        self.unindex_hold(prev, *slot_id);
                    }
                    slot.state = SlotState::Held {
                        user_id: *user_id,
                        expires_at: *expires_at,
                    };
                    self.index_hold(*user_id, *slot_id);
                }
            }
            Event::SlotReleased { slot_id, .. } => {
                let ss = guard.expect("seat guard required");
                if let Some(slot) = ss.find_mut(*slot_id) {
                    if let SlotState::Held { user_id, .. } = slot.state {
                        self.unindex_hold(user_id, *slot_id);
                    }
                    slot.state = SlotState::Open;
                }
            }
            Event::SlotFrozen { slot_id, .. } => {
                let ss = guard.expect("seat guard required");
                if let Some(slot) = ss.find_mut(*slot_id) {
                    if let SlotState::Held { user_id, .. } = slot.state {
                        self.unindex_hold(user_id, *slot_id);
                    }
                    slot.state = SlotState::Frozen;
                }
            }
            Event::SlotUnfrozen { slot_id, .. } => {
                let ss = guard.expect("seat guard required");
                if let Some(slot) = ss.find_mut(*slot_id) {
                    slot.state = SlotState::Open;
                }
            }
            Event::HoldsSwept { slot_ids, .. } => {
                let ss = guard.expect("seat guard required");
                for slot_id in slot_ids {
                    if let Some(slot) = ss.find_mut(*slot_id) {
                        if let SlotState::Held { user_id, .. } = slot.state {
                            self.unindex_hold(user_id, *slot_id);
                            slot.state = SlotState::Open;
                        }
                    }
                }
            }
            Event::BookingRecorded { booking } => {
                let ss = guard.expect("seat guard required");
                if booking.is_active()
                    && let Some(slot) = ss.find_mut(booking.slot_id)
                {
                    if let SlotState::Held { user_id, .. } = slot.state {
                        self.unindex_hold(user_id, booking.slot_id);
                    }
                    slot.state = SlotState::Booked;
                }
                let mut by_user = self.bookings_by_user.entry(booking.user_id).or_default();
                if !by_user.contains(&booking.id) {
                    by_user.push(booking.id);
                }
                drop(by_user);
                self.bookings.insert(booking.id, booking.clone());
            }
            Event::BookingCanceled {
                booking_id,
                slot_id,
                at,
                reason,
                ..
            } => {
                let ss = guard.expect("seat guard required");
                if let Some(mut b) = self.bookings.get_mut(booking_id) {
                    b.status = BookingStatus::Canceled;
                    b.canceled_at = Some(*at);
                    b.cancellation_reason = reason.clone();
                }
                // The slot goes back to OPEN whatever its current state.
                if let Some(slot) = ss.find_mut(*slot_id) {
                    if let SlotState::Held { user_id, .. } = slot.state {
                        self.unindex_hold(user_id, *slot_id);
                    }
                    slot.state = SlotState::Open;
                }
            }
            Event::BookingNoShow { booking_id, at } => {
                if let Some(mut b) = self.bookings.get_mut(booking_id) {
                    b.status = BookingStatus::NoShow;
                    b.no_show_at = Some(*at);
                }
            }
        }
    }

    /// Rewrite the journal with only the events needed to recreate the
    /// current state: catalog, per-seat slot snapshots, then bookings.
    pub async fn compact_journal(&self) -> Result<(), EngineError> {
        let mut events = self.catalog.snapshot_events();

        for seat_id in self.all_seat_ids() {
            let Some(rs) = self.seat_slots(&seat_id) else {
                continue;
            };
            let guard = rs.read().await;
            if !guard.slots.is_empty() {
                events.push(Event::SlotsGenerated {
                    seat_id,
                    slots: guard.slots.clone(),
                });
            }
        }

        for booking in self.all_bookings() {
            events.push(Event::BookingRecorded { booking });
        }

        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::JournalError(e.to_string()))
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Seat whose lock an event must be applied under, if any.
fn event_seat_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::SlotsGenerated { seat_id, .. }
        | Event::SlotDeleted { seat_id, .. }
        | Event::HoldPlaced { seat_id, .. }
        | Event::SlotReleased { seat_id, .. }
        | Event::SlotFrozen { seat_id, .. }
        | Event::SlotUnfrozen { seat_id, .. }
        | Event::HoldsSwept { seat_id, .. }
        | Event::BookingCanceled { seat_id, .. } => Some(*seat_id),
        Event::BookingRecorded { booking } => Some(booking.seat_id),
        _ => None,
    }
}
