//! Postgres store.
//!
//! Repository over `sqlx::PgPool`. Slot-scoped transactions run at
//! SERIALIZABLE isolation and take a `FOR UPDATE` lock on the slot row
//! before reading any dependent state, so two writers racing for the last
//! seat are serialized by the database. Queries use the runtime-checked
//! API; the schema lives in `migrations/` (see [`crate::migrator`]).

use crate::db::errors::Result;
use crate::db::models::assignments::{Assignment, AssignmentCancellation, AssignmentCreate, AssignmentStatus};
use crate::db::models::scenarios::{ScenarioTemplate, TemplateSlot};
use crate::db::models::slots::Slot;
use crate::db::models::waiting_list::{WaitingEntry, WaitingStatus};
use crate::db::store::{SlotTx, Store};
use crate::types::{AssignmentId, LocationId, ParticipantId, ScenarioId, SlotId, WaitingEntryId};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;
use uuid::Uuid;

const SLOT_COLUMNS: &str = "id, location_id, date, start_time, end_time, slot_type, \
     min_participants, max_participants, current_participants, status, priority, \
     scenario_id, created_by, created_at, updated_at";

const ASSIGNMENT_COLUMNS: &str = "id, slot_id, participant_id, assigned_by, kind, status, \
     created_at, cancelled_at, cancel_reason, replacement_participant_id, replacement_deadline";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    #[instrument(skip(self), err)]
    async fn get_slot(&self, id: SlotId) -> Result<Option<Slot>> {
        let slot = sqlx::query_as::<_, Slot>(&format!("SELECT {SLOT_COLUMNS} FROM slots WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(slot)
    }

    #[instrument(skip(self), err)]
    async fn slots_for_day(&self, location: LocationId, date: NaiveDate) -> Result<Vec<Slot>> {
        let slots = sqlx::query_as::<_, Slot>(&format!(
            "SELECT {SLOT_COLUMNS} FROM slots \
             WHERE location_id = $1 AND date = $2 AND status <> 'cancelled' \
             ORDER BY start_time"
        ))
        .bind(location)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(slots)
    }

    #[instrument(skip(self), err)]
    async fn waiting_entries(&self, slot: SlotId) -> Result<Vec<WaitingEntry>> {
        let entries = sqlx::query_as::<_, WaitingEntry>(
            "SELECT id, slot_id, participant_id, rank, status, created_at \
             FROM waiting_list WHERE slot_id = $1 AND status = 'waiting' ORDER BY rank",
        )
        .bind(slot)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    #[instrument(skip(self), err)]
    async fn get_scenario(&self, id: ScenarioId) -> Result<Option<ScenarioTemplate>> {
        let scenario = sqlx::query_as::<_, ScenarioTemplate>(
            "SELECT id, name, location_id, active, created_by, created_at FROM scenarios WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(scenario)
    }

    #[instrument(skip(self), err)]
    async fn template_slots(&self, scenario: ScenarioId) -> Result<Vec<TemplateSlot>> {
        let slots = sqlx::query_as::<_, TemplateSlot>(
            "SELECT id, scenario_id, weekday, start_time, end_time, slot_type, \
             min_participants, max_participants, priority \
             FROM scenario_slots WHERE scenario_id = $1 ORDER BY weekday, start_time",
        )
        .bind(scenario)
        .fetch_all(&self.pool)
        .await?;
        Ok(slots)
    }

    #[instrument(skip(self, slot), fields(slot = %crate::types::abbrev_uuid(&slot.id)), err)]
    async fn insert_slot(&self, slot: &Slot) -> Result<()> {
        sqlx::query(
            "INSERT INTO slots (id, location_id, date, start_time, end_time, slot_type, \
             min_participants, max_participants, current_participants, status, priority, \
             scenario_id, created_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .bind(slot.id)
        .bind(slot.location_id)
        .bind(slot.date)
        .bind(slot.start_time)
        .bind(slot.end_time)
        .bind(slot.slot_type)
        .bind(slot.min_participants)
        .bind(slot.max_participants)
        .bind(slot.current_participants)
        .bind(slot.status)
        .bind(slot.priority)
        .bind(slot.scenario_id)
        .bind(slot.created_by)
        .bind(slot.created_at)
        .bind(slot.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn begin_slot(&self, id: SlotId) -> Result<Option<Box<dyn SlotTx>>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        let slot = sqlx::query_as::<_, Slot>(&format!("SELECT {SLOT_COLUMNS} FROM slots WHERE id = $1 FOR UPDATE"))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        match slot {
            Some(slot) => Ok(Some(Box::new(PgSlotTx { tx, slot }))),
            None => {
                tx.rollback().await?;
                Ok(None)
            }
        }
    }
}

struct PgSlotTx {
    tx: Transaction<'static, Postgres>,
    slot: Slot,
}

#[async_trait]
impl SlotTx for PgSlotTx {
    fn slot(&self) -> &Slot {
        &self.slot
    }

    async fn store_slot(&mut self, slot: &Slot) -> Result<()> {
        sqlx::query(
            "UPDATE slots SET location_id = $2, date = $3, start_time = $4, end_time = $5, \
             slot_type = $6, min_participants = $7, max_participants = $8, \
             current_participants = $9, status = $10, priority = $11, scenario_id = $12, \
             updated_at = $13 WHERE id = $1",
        )
        .bind(slot.id)
        .bind(slot.location_id)
        .bind(slot.date)
        .bind(slot.start_time)
        .bind(slot.end_time)
        .bind(slot.slot_type)
        .bind(slot.min_participants)
        .bind(slot.max_participants)
        .bind(slot.current_participants)
        .bind(slot.status)
        .bind(slot.priority)
        .bind(slot.scenario_id)
        .bind(slot.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find_confirmed(&mut self, participant: ParticipantId) -> Result<Option<Assignment>> {
        let assignment = sqlx::query_as::<_, Assignment>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments \
             WHERE slot_id = $1 AND participant_id = $2 AND status = 'confirmed'"
        ))
        .bind(self.slot.id)
        .bind(participant)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(assignment)
    }

    async fn confirmed_assignments(&mut self) -> Result<Vec<Assignment>> {
        let assignments = sqlx::query_as::<_, Assignment>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments \
             WHERE slot_id = $1 AND status = 'confirmed' ORDER BY created_at"
        ))
        .bind(self.slot.id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(assignments)
    }

    async fn insert_assignment(&mut self, request: &AssignmentCreate, now: DateTime<Utc>) -> Result<Assignment> {
        let assignment = sqlx::query_as::<_, Assignment>(&format!(
            "INSERT INTO assignments (id, slot_id, participant_id, assigned_by, kind, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {ASSIGNMENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(request.slot_id)
        .bind(request.participant_id)
        .bind(request.assigned_by)
        .bind(request.kind)
        .bind(AssignmentStatus::Confirmed)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(assignment)
    }

    async fn cancel_assignment(&mut self, id: AssignmentId, cancellation: &AssignmentCancellation) -> Result<Assignment> {
        let assignment = sqlx::query_as::<_, Assignment>(&format!(
            "UPDATE assignments SET status = 'cancelled', cancelled_at = $2, cancel_reason = $3, \
             replacement_participant_id = $4, replacement_deadline = $5 \
             WHERE id = $1 RETURNING {ASSIGNMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(cancellation.cancelled_at)
        .bind(&cancellation.reason)
        .bind(cancellation.replacement_participant_id)
        .bind(cancellation.replacement_deadline)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(assignment)
    }

    async fn find_waiting(&mut self, participant: ParticipantId) -> Result<Option<WaitingEntry>> {
        let entry = sqlx::query_as::<_, WaitingEntry>(
            "SELECT id, slot_id, participant_id, rank, status, created_at FROM waiting_list \
             WHERE slot_id = $1 AND participant_id = $2 AND status = 'waiting'",
        )
        .bind(self.slot.id)
        .bind(participant)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(entry)
    }

    async fn waiting_entries(&mut self) -> Result<Vec<WaitingEntry>> {
        let entries = sqlx::query_as::<_, WaitingEntry>(
            "SELECT id, slot_id, participant_id, rank, status, created_at FROM waiting_list \
             WHERE slot_id = $1 AND status = 'waiting' ORDER BY rank",
        )
        .bind(self.slot.id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(entries)
    }

    async fn insert_waiting(&mut self, participant: ParticipantId, now: DateTime<Utc>) -> Result<WaitingEntry> {
        // rank comes from the table's BIGSERIAL sequence: monotonic even
        // under concurrent joiners.
        let entry = sqlx::query_as::<_, WaitingEntry>(
            "INSERT INTO waiting_list (id, slot_id, participant_id, status, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, slot_id, participant_id, rank, status, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(self.slot.id)
        .bind(participant)
        .bind(WaitingStatus::Waiting)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(entry)
    }

    async fn set_waiting_status(&mut self, entry: WaitingEntryId, status: WaitingStatus) -> Result<()> {
        sqlx::query("UPDATE waiting_list SET status = $2 WHERE id = $1")
            .bind(entry)
            .bind(status)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
