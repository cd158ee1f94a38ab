//! Static reference data: coworkings, workspaces and seats.
//!
//! The containment hierarchy (coworking → workspace → seat) is kept as
//! id-keyed maps plus parent→children indexes; "active" is derived through
//! the chain by explicit functions, never stored.

use chrono::NaiveTime;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::model::{Event, OpenHours};

/// A physical site with daily operating hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coworking {
    pub id: Ulid,
    pub name: String,
    pub address: String,
    pub timezone: String,
    pub open_from: NaiveTime,
    pub open_to: NaiveTime,
    pub active: bool,
}

impl Coworking {
    pub fn hours(&self) -> OpenHours {
        OpenHours {
            open: self.open_from,
            close: self.open_to,
        }
    }

}

/// A bookable area inside a coworking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Ulid,
    pub coworking_id: Ulid,
    pub name: String,
    pub seats_total: u32,
    pub price_per_hour: Decimal,
    pub active: bool,
    /// Daily open/close override; falls back to the coworking's hours.
    pub open_override: Option<OpenHours>,
}

/// One physical seat, with a code unique within its workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceSeat {
    pub id: Ulid,
    pub workspace_id: Ulid,
    pub code: String,
    pub active: bool,
}

pub struct Catalog {
    coworkings: DashMap<Ulid, Coworking>,
    workspaces: DashMap<Ulid, Workspace>,
    seats: DashMap<Ulid, WorkspaceSeat>,
    /// Parent → children indexes for O(1) child lookups.
    workspaces_by_coworking: DashMap<Ulid, Vec<Ulid>>,
    seats_by_workspace: DashMap<Ulid, Vec<Ulid>>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            coworkings: DashMap::new(),
            workspaces: DashMap::new(),
            seats: DashMap::new(),
            workspaces_by_coworking: DashMap::new(),
            seats_by_workspace: DashMap::new(),
        }
    }

    pub fn coworking(&self, id: &Ulid) -> Option<Coworking> {
        self.coworkings.get(id).map(|e| e.value().clone())
    }

    pub fn workspace(&self, id: &Ulid) -> Option<Workspace> {
        self.workspaces.get(id).map(|e| e.value().clone())
    }

    pub fn seat(&self, id: &Ulid) -> Option<WorkspaceSeat> {
        self.seats.get(id).map(|e| e.value().clone())
    }

    pub fn contains_coworking(&self, id: &Ulid) -> bool {
        self.coworkings.contains_key(id)
    }

    pub fn contains_workspace(&self, id: &Ulid) -> bool {
        self.workspaces.contains_key(id)
    }

    pub fn contains_seat(&self, id: &Ulid) -> bool {
        self.seats.contains_key(id)
    }

    pub fn workspaces_of(&self, coworking_id: &Ulid) -> Vec<Ulid> {
        self.workspaces_by_coworking
            .get(coworking_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub fn seats_of(&self, workspace_id: &Ulid) -> Vec<Ulid> {
        self.seats_by_workspace
            .get(workspace_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    /// A workspace is active only if both its own flag and its owning
    /// coworking's flag are true.
    pub fn workspace_is_active(&self, id: &Ulid) -> bool {
        let Some(ws) = self.workspaces.get(id) else {
            return false;
        };
        ws.active
            && self
                .coworkings
                .get(&ws.coworking_id)
                .is_some_and(|cw| cw.active)
    }

    /// Seat activity is derived through workspace → coworking.
    pub fn seat_is_active(&self, id: &Ulid) -> bool {
        let Some(seat) = self.seats.get(id) else {
            return false;
        };
        seat.active && self.workspace_is_active(&seat.workspace_id)
    }

    /// Seat ids of a workspace whose derived activity is true.
    pub fn active_seats(&self, workspace_id: &Ulid) -> Vec<Ulid> {
        if !self.workspace_is_active(workspace_id) {
            return Vec::new();
        }
        self.seats_of(workspace_id)
            .into_iter()
            .filter(|sid| self.seats.get(sid).is_some_and(|s| s.active))
            .collect()
    }

    /// All active workspaces, across coworkings.
    pub fn active_workspaces(&self) -> Vec<Ulid> {
        self.workspaces
            .iter()
            .filter(|e| self.workspace_is_active(e.key()))
            .map(|e| *e.key())
            .collect()
    }

    pub fn active_workspaces_of(&self, coworking_id: &Ulid) -> Vec<Ulid> {
        self.workspaces_of(coworking_id)
            .into_iter()
            .filter(|wid| self.workspace_is_active(wid))
            .collect()
    }

    /// Effective daily hours for a workspace: its override, else the
    /// owning coworking's hours.
    pub fn operating_hours(&self, workspace_id: &Ulid) -> Option<OpenHours> {
        let ws = self.workspaces.get(workspace_id)?;
        if let Some(hours) = ws.open_override {
            return Some(hours);
        }
        self.coworkings.get(&ws.coworking_id).map(|cw| cw.hours())
    }

    pub fn seat_code(&self, seat_id: &Ulid) -> Option<String> {
        self.seats.get(seat_id).map(|s| s.code.clone())
    }

    /// Display code: "{workspace name}-{seat code}".
    pub fn seat_full_code(&self, seat_id: &Ulid) -> Option<String> {
        let seat = self.seats.get(seat_id)?;
        let ws = self.workspaces.get(&seat.workspace_id)?;
        Some(format!("{}-{}", ws.name, seat.code))
    }

    /// Apply a catalog-scoped journal event. Non-catalog events are ignored.
    pub fn apply_event(&self, event: &Event) {
        match event {
            Event::CoworkingCreated { coworking } => {
                self.coworkings.insert(coworking.id, coworking.clone());
            }
            Event::WorkspaceCreated { workspace } => {
                self.workspaces_by_coworking
                    .entry(workspace.coworking_id)
                    .or_default()
                    .push(workspace.id);
                self.workspaces.insert(workspace.id, workspace.clone());
            }
            Event::SeatCreated { seat } => {
                self.seats_by_workspace
                    .entry(seat.workspace_id)
                    .or_default()
                    .push(seat.id);
                self.seats.insert(seat.id, seat.clone());
            }
            Event::CoworkingActiveSet { id, active } => {
                if let Some(mut cw) = self.coworkings.get_mut(id) {
                    cw.active = *active;
                }
            }
            Event::WorkspaceActiveSet { id, active } => {
                if let Some(mut ws) = self.workspaces.get_mut(id) {
                    ws.active = *active;
                }
            }
            Event::SeatActiveSet { id, active } => {
                if let Some(mut seat) = self.seats.get_mut(id) {
                    seat.active = *active;
                }
            }
            _ => {}
        }
    }

    /// Emit the minimal event list that recreates the catalog (compaction).
    pub fn snapshot_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        for e in self.coworkings.iter() {
            events.push(Event::CoworkingCreated {
                coworking: e.value().clone(),
            });
        }
        for e in self.workspaces.iter() {
            events.push(Event::WorkspaceCreated {
                workspace: e.value().clone(),
            });
        }
        for e in self.seats.iter() {
            events.push(Event::SeatCreated {
                seat: e.value().clone(),
            });
        }
        events
    }
}
