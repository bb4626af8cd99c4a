//! Storage ports for the engine.
//!
//! Services are constructed with an injected [`Store`] rather than reaching
//! for a module-level singleton. Two implementations ship with the crate:
//! [`crate::db::postgres::PgStore`] (serializable transactions, `FOR
//! UPDATE` row locks) and [`crate::db::memory::MemoryStore`] (per-slot
//! async mutexes with staged writes).
//!
//! The transaction surface is a single [`SlotTx`] rather than one port per
//! table: register and cancel mutate the slot row, its assignments and its
//! waiting entries atomically under one slot lock, so splitting the ports
//! would only move the coupling into the call sites.

use crate::db::errors::Result;
use crate::db::models::assignments::{Assignment, AssignmentCancellation, AssignmentCreate};
use crate::db::models::scenarios::{ScenarioTemplate, TemplateSlot};
use crate::db::models::slots::Slot;
use crate::db::models::waiting_list::{WaitingEntry, WaitingStatus};
use crate::types::{AssignmentId, LocationId, ParticipantId, ScenarioId, SlotId, WaitingEntryId};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

/// Root storage port. Read methods take no lock.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_slot(&self, id: SlotId) -> Result<Option<Slot>>;

    /// Non-cancelled slots at a location on a given date, used for overlap
    /// validation and listings.
    async fn slots_for_day(&self, location: LocationId, date: NaiveDate) -> Result<Vec<Slot>>;

    /// Waiting entries with status `Waiting` on a slot, rank ascending.
    async fn waiting_entries(&self, slot: SlotId) -> Result<Vec<WaitingEntry>>;

    async fn get_scenario(&self, id: ScenarioId) -> Result<Option<ScenarioTemplate>>;

    async fn template_slots(&self, scenario: ScenarioId) -> Result<Vec<TemplateSlot>>;

    /// Persist a freshly built slot. There is no existing row to lock, so
    /// this is a plain insert; overlap validation happens in the registry
    /// before the call.
    async fn insert_slot(&self, slot: &Slot) -> Result<()>;

    /// Open a serialized, slot-scoped transaction holding a write lock on
    /// the slot row. Returns `None` when the slot does not exist. Dropping
    /// the returned transaction without [`SlotTx::commit`] rolls it back.
    async fn begin_slot(&self, id: SlotId) -> Result<Option<Box<dyn SlotTx>>>;
}

/// A slot-scoped transaction. All writes become visible atomically at
/// [`commit`](SlotTx::commit); reads observe writes staged earlier in the
/// same transaction.
#[async_trait]
pub trait SlotTx: Send {
    /// Snapshot of the locked slot row as of transaction start.
    fn slot(&self) -> &Slot;

    /// Write back the full slot row (counter, status, schedule fields).
    async fn store_slot(&mut self, slot: &Slot) -> Result<()>;

    /// Confirmed assignment for this participant on the locked slot.
    async fn find_confirmed(&mut self, participant: ParticipantId) -> Result<Option<Assignment>>;

    /// All confirmed assignments on the locked slot.
    async fn confirmed_assignments(&mut self) -> Result<Vec<Assignment>>;

    async fn insert_assignment(&mut self, request: &AssignmentCreate, now: DateTime<Utc>) -> Result<Assignment>;

    /// Stamp cancellation fields onto an assignment. The row stays in place
    /// as audit trail.
    async fn cancel_assignment(&mut self, id: AssignmentId, cancellation: &AssignmentCancellation) -> Result<Assignment>;

    /// Waiting entry with status `Waiting` for this participant, if any.
    async fn find_waiting(&mut self, participant: ParticipantId) -> Result<Option<WaitingEntry>>;

    /// Waiting entries with status `Waiting`, rank ascending.
    async fn waiting_entries(&mut self) -> Result<Vec<WaitingEntry>>;

    /// Append a waiting entry; rank comes from a monotonic sequence.
    async fn insert_waiting(&mut self, participant: ParticipantId, now: DateTime<Utc>) -> Result<WaitingEntry>;

    async fn set_waiting_status(&mut self, entry: WaitingEntryId, status: WaitingStatus) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
