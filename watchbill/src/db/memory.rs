//! In-process store.
//!
//! Backs the test suite and embedded deployments. Serialization is per
//! slot, like the Postgres store's row locks: a transaction holds the
//! slot's async mutex for its whole lifetime and stages writes that are
//! applied to the shared maps only at commit, so dropping a transaction
//! rolls it back and concurrent writers on the same slot queue behind each
//! other. Reads outside a transaction take no lock.

use crate::db::errors::{DbError, Result};
use crate::db::models::assignments::{Assignment, AssignmentCancellation, AssignmentCreate, AssignmentStatus};
use crate::db::models::scenarios::{ScenarioTemplate, TemplateSlot};
use crate::db::models::slots::Slot;
use crate::db::models::waiting_list::{WaitingEntry, WaitingStatus};
use crate::db::store::{SlotTx, Store};
use crate::types::{AssignmentId, LocationId, ParticipantId, ScenarioId, SlotId, WaitingEntryId};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    slots: DashMap<SlotId, Slot>,
    locks: DashMap<SlotId, Arc<Mutex<()>>>,
    assignments: DashMap<AssignmentId, Assignment>,
    waiting: DashMap<WaitingEntryId, WaitingEntry>,
    scenarios: DashMap<ScenarioId, ScenarioTemplate>,
    template_slots: DashMap<Uuid, TemplateSlot>,
    rank_seq: AtomicI64,
}

/// Shared-state store; cheap to clone.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a scenario template with its per-weekday slots.
    pub fn insert_scenario(&self, template: ScenarioTemplate, slots: Vec<TemplateSlot>) {
        for slot in slots {
            self.state.template_slots.insert(slot.id, slot);
        }
        self.state.scenarios.insert(template.id, template);
    }

    /// All assignments on a slot, confirmed and cancelled. Intended for
    /// inspection and invariant checks.
    pub fn assignments_for_slot(&self, slot: SlotId) -> Vec<Assignment> {
        let mut rows: Vec<Assignment> = self
            .state
            .assignments
            .iter()
            .filter(|a| a.slot_id == slot)
            .map(|a| a.clone())
            .collect();
        rows.sort_by_key(|a| a.created_at);
        rows
    }

    /// All waiting entries on a slot regardless of status, rank ascending.
    pub fn waiting_for_slot(&self, slot: SlotId) -> Vec<WaitingEntry> {
        let mut rows: Vec<WaitingEntry> = self
            .state
            .waiting
            .iter()
            .filter(|w| w.slot_id == slot)
            .map(|w| w.clone())
            .collect();
        rows.sort_by_key(|w| w.rank);
        rows
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_slot(&self, id: SlotId) -> Result<Option<Slot>> {
        Ok(self.state.slots.get(&id).map(|s| s.clone()))
    }

    async fn slots_for_day(&self, location: LocationId, date: NaiveDate) -> Result<Vec<Slot>> {
        let mut rows: Vec<Slot> = self
            .state
            .slots
            .iter()
            .filter(|s| s.location_id == location && s.date == date && s.status != crate::db::models::slots::SlotStatus::Cancelled)
            .map(|s| s.clone())
            .collect();
        rows.sort_by_key(|s| s.start_time);
        Ok(rows)
    }

    async fn waiting_entries(&self, slot: SlotId) -> Result<Vec<WaitingEntry>> {
        let mut rows: Vec<WaitingEntry> = self
            .state
            .waiting
            .iter()
            .filter(|w| w.slot_id == slot && w.status == WaitingStatus::Waiting)
            .map(|w| w.clone())
            .collect();
        rows.sort_by_key(|w| w.rank);
        Ok(rows)
    }

    async fn get_scenario(&self, id: ScenarioId) -> Result<Option<ScenarioTemplate>> {
        Ok(self.state.scenarios.get(&id).map(|s| s.clone()))
    }

    async fn template_slots(&self, scenario: ScenarioId) -> Result<Vec<TemplateSlot>> {
        let mut rows: Vec<TemplateSlot> = self
            .state
            .template_slots
            .iter()
            .filter(|t| t.scenario_id == scenario)
            .map(|t| t.clone())
            .collect();
        rows.sort_by(|a, b| (a.weekday, a.start_time).cmp(&(b.weekday, b.start_time)));
        Ok(rows)
    }

    async fn insert_slot(&self, slot: &Slot) -> Result<()> {
        self.state.slots.insert(slot.id, slot.clone());
        Ok(())
    }

    async fn begin_slot(&self, id: SlotId) -> Result<Option<Box<dyn SlotTx>>> {
        // Clone the Arc out before awaiting so no dashmap shard guard is
        // held across the lock acquisition.
        let lock = self
            .state
            .locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;

        let Some(slot) = self.state.slots.get(&id).map(|s| s.clone()) else {
            return Ok(None);
        };

        Ok(Some(Box::new(MemoryTx {
            state: Arc::clone(&self.state),
            _guard: guard,
            slot,
            staged_slot: None,
            staged_assignments: Vec::new(),
            staged_waiting: Vec::new(),
        })))
    }
}

struct MemoryTx {
    state: Arc<MemoryState>,
    _guard: OwnedMutexGuard<()>,
    slot: Slot,
    staged_slot: Option<Slot>,
    staged_assignments: Vec<Assignment>,
    staged_waiting: Vec<WaitingEntry>,
}

impl MemoryTx {
    /// Committed assignments for this slot with staged writes overlaid.
    fn merged_assignments(&self) -> Vec<Assignment> {
        let mut rows: Vec<Assignment> = self
            .state
            .assignments
            .iter()
            .filter(|a| a.slot_id == self.slot.id)
            .map(|a| a.clone())
            .collect();
        for staged in &self.staged_assignments {
            match rows.iter_mut().find(|r| r.id == staged.id) {
                Some(row) => *row = staged.clone(),
                None => rows.push(staged.clone()),
            }
        }
        rows
    }

    fn merged_waiting(&self) -> Vec<WaitingEntry> {
        let mut rows: Vec<WaitingEntry> = self
            .state
            .waiting
            .iter()
            .filter(|w| w.slot_id == self.slot.id)
            .map(|w| w.clone())
            .collect();
        for staged in &self.staged_waiting {
            match rows.iter_mut().find(|r| r.id == staged.id) {
                Some(row) => *row = staged.clone(),
                None => rows.push(staged.clone()),
            }
        }
        rows.sort_by_key(|w| w.rank);
        rows
    }
}

#[async_trait]
impl SlotTx for MemoryTx {
    fn slot(&self) -> &Slot {
        &self.slot
    }

    async fn store_slot(&mut self, slot: &Slot) -> Result<()> {
        self.staged_slot = Some(slot.clone());
        Ok(())
    }

    async fn find_confirmed(&mut self, participant: ParticipantId) -> Result<Option<Assignment>> {
        Ok(self
            .merged_assignments()
            .into_iter()
            .find(|a| a.participant_id == participant && a.status == AssignmentStatus::Confirmed))
    }

    async fn confirmed_assignments(&mut self) -> Result<Vec<Assignment>> {
        Ok(self
            .merged_assignments()
            .into_iter()
            .filter(|a| a.status == AssignmentStatus::Confirmed)
            .collect())
    }

    async fn insert_assignment(&mut self, request: &AssignmentCreate, now: DateTime<Utc>) -> Result<Assignment> {
        let assignment = Assignment {
            id: Uuid::new_v4(),
            slot_id: request.slot_id,
            participant_id: request.participant_id,
            assigned_by: request.assigned_by,
            kind: request.kind,
            status: AssignmentStatus::Confirmed,
            created_at: now,
            cancelled_at: None,
            cancel_reason: None,
            replacement_participant_id: None,
            replacement_deadline: None,
        };
        self.staged_assignments.push(assignment.clone());
        Ok(assignment)
    }

    async fn cancel_assignment(&mut self, id: AssignmentId, cancellation: &AssignmentCancellation) -> Result<Assignment> {
        let mut assignment = self
            .merged_assignments()
            .into_iter()
            .find(|a| a.id == id)
            .ok_or(DbError::NotFound)?;
        assignment.status = AssignmentStatus::Cancelled;
        assignment.cancelled_at = Some(cancellation.cancelled_at);
        assignment.cancel_reason = Some(cancellation.reason.clone());
        assignment.replacement_participant_id = cancellation.replacement_participant_id;
        assignment.replacement_deadline = cancellation.replacement_deadline;
        self.staged_assignments.push(assignment.clone());
        Ok(assignment)
    }

    async fn find_waiting(&mut self, participant: ParticipantId) -> Result<Option<WaitingEntry>> {
        Ok(self
            .merged_waiting()
            .into_iter()
            .find(|w| w.participant_id == participant && w.status == WaitingStatus::Waiting))
    }

    async fn waiting_entries(&mut self) -> Result<Vec<WaitingEntry>> {
        Ok(self
            .merged_waiting()
            .into_iter()
            .filter(|w| w.status == WaitingStatus::Waiting)
            .collect())
    }

    async fn insert_waiting(&mut self, participant: ParticipantId, now: DateTime<Utc>) -> Result<WaitingEntry> {
        let entry = WaitingEntry {
            id: Uuid::new_v4(),
            slot_id: self.slot.id,
            participant_id: participant,
            rank: self.state.rank_seq.fetch_add(1, Ordering::SeqCst) + 1,
            status: WaitingStatus::Waiting,
            created_at: now,
        };
        self.staged_waiting.push(entry.clone());
        Ok(entry)
    }

    async fn set_waiting_status(&mut self, entry: WaitingEntryId, status: WaitingStatus) -> Result<()> {
        let mut row = self
            .merged_waiting()
            .into_iter()
            .find(|w| w.id == entry)
            .ok_or(DbError::NotFound)?;
        row.status = status;
        self.staged_waiting.push(row);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if let Some(slot) = self.staged_slot {
            self.state.slots.insert(slot.id, slot);
        }
        for assignment in self.staged_assignments {
            self.state.assignments.insert(assignment.id, assignment);
        }
        for entry in self.staged_waiting {
            self.state.waiting.insert(entry.id, entry);
        }
        Ok(())
    }
}
