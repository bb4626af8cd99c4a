//! Slot creation, schedule updates and whole-slot cancellation.

use crate::audit::{record, AuditLog};
use crate::db::models::slots::{Slot, SlotCreate, SlotStatus, SlotUpdate};
use crate::db::models::waiting_list::WaitingStatus;
use crate::db::store::Store;
use crate::errors::{Error, Result};
use crate::notify::{dispatch_all, Notification, NotificationDispatcher};
use crate::types::{abbrev_uuid, LocationId, ParticipantId, SlotId};
use chrono::{NaiveDate, NaiveTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

pub struct SlotRegistry {
    store: Arc<dyn Store>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    audit: Arc<dyn AuditLog>,
}

impl SlotRegistry {
    pub fn new(store: Arc<dyn Store>, dispatcher: Arc<dyn NotificationDispatcher>, audit: Arc<dyn AuditLog>) -> Self {
        Self { store, dispatcher, audit }
    }

    /// Create a slot after time-window and overlap validation.
    #[instrument(skip(self, request), fields(location = %abbrev_uuid(&request.location_id), date = %request.date), err)]
    pub async fn create(&self, request: SlotCreate, creator: ParticipantId) -> Result<Slot> {
        validate_window(request.start_time, request.end_time)?;
        self.check_overlap(request.location_id, request.date, request.start_time, request.end_time, None)
            .await?;

        let now = Utc::now();
        let slot = Slot {
            id: Uuid::new_v4(),
            location_id: request.location_id,
            date: request.date,
            start_time: request.start_time,
            end_time: request.end_time,
            slot_type: request.slot_type,
            min_participants: request.min_participants,
            max_participants: request.max_participants,
            current_participants: 0,
            status: SlotStatus::Open,
            priority: request.priority,
            scenario_id: request.scenario_id,
            created_by: creator,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_slot(&slot).await?;

        record(
            self.audit.as_ref(),
            "slot.create",
            slot.id,
            json!({ "location_id": slot.location_id, "date": slot.date, "created_by": creator }),
        )
        .await;
        Ok(slot)
    }

    /// Patch schedule fields of an existing slot.
    #[instrument(skip(self, patch), fields(slot = %abbrev_uuid(&slot_id)), err)]
    pub async fn update(&self, slot_id: SlotId, patch: SlotUpdate, actor: ParticipantId) -> Result<Slot> {
        let mut tx = self.store.begin_slot(slot_id).await?.ok_or(Error::GuardNotFound(slot_id))?;
        let mut slot = tx.slot().clone();

        if slot.status == SlotStatus::Cancelled {
            return Err(Error::GuardClosed(slot_id));
        }

        if let Some(max) = patch.max_participants {
            if max < slot.current_participants {
                return Err(Error::InvalidMax {
                    requested: max,
                    current: slot.current_participants,
                });
            }
            slot.max_participants = max;
        }
        if let Some(min) = patch.min_participants {
            slot.min_participants = min;
        }
        if let Some(slot_type) = patch.slot_type {
            slot.slot_type = slot_type;
        }
        if let Some(priority) = patch.priority {
            slot.priority = priority;
        }

        let window_changed = patch.start_time.is_some() || patch.end_time.is_some();
        if window_changed {
            let start = patch.start_time.unwrap_or(slot.start_time);
            let end = patch.end_time.unwrap_or(slot.end_time);
            validate_window(start, end)?;
            self.check_overlap(slot.location_id, slot.date, start, end, Some(slot_id)).await?;
            slot.start_time = start;
            slot.end_time = end;
        }

        slot.recompute_status();
        slot.updated_at = Utc::now();
        tx.store_slot(&slot).await?;
        tx.commit().await?;

        record(self.audit.as_ref(), "slot.update", slot_id, json!({ "actor": actor })).await;
        Ok(slot)
    }

    /// Cancel a slot and every confirmed assignment on it. Terminal.
    #[instrument(skip(self, reason), fields(slot = %abbrev_uuid(&slot_id)), err)]
    pub async fn cancel_slot(&self, slot_id: SlotId, reason: &str, actor: ParticipantId) -> Result<Slot> {
        let mut tx = self.store.begin_slot(slot_id).await?.ok_or(Error::GuardNotFound(slot_id))?;
        let mut slot = tx.slot().clone();

        if slot.status == SlotStatus::Cancelled {
            return Err(Error::GuardClosed(slot_id));
        }

        let now = Utc::now();
        let confirmed = tx.confirmed_assignments().await?;
        for assignment in &confirmed {
            tx.cancel_assignment(
                assignment.id,
                &crate::db::models::assignments::AssignmentCancellation {
                    cancelled_at: now,
                    reason: reason.to_string(),
                    replacement_participant_id: None,
                    replacement_deadline: None,
                },
            )
            .await?;
        }
        for entry in tx.waiting_entries().await? {
            tx.set_waiting_status(entry.id, WaitingStatus::Cancelled).await?;
        }

        slot.current_participants = 0;
        slot.status = SlotStatus::Cancelled;
        slot.updated_at = now;
        tx.store_slot(&slot).await?;
        tx.commit().await?;

        // Post-commit fan-out, outside the slot lock.
        let batch = confirmed
            .iter()
            .map(|a| {
                (
                    a.participant_id,
                    Notification::SlotCancelled {
                        slot_id,
                        reason: reason.to_string(),
                    },
                )
            })
            .collect();
        dispatch_all(self.dispatcher.as_ref(), batch).await;

        record(
            self.audit.as_ref(),
            "slot.cancel",
            slot_id,
            json!({ "actor": actor, "reason": reason, "affected": confirmed.len() }),
        )
        .await;
        Ok(slot)
    }

    pub async fn get(&self, slot_id: SlotId) -> Result<Slot> {
        self.store.get_slot(slot_id).await?.ok_or(Error::GuardNotFound(slot_id))
    }

    /// Non-cancelled slots at a location on a date, start time ascending.
    pub async fn list_for_day(&self, location: LocationId, date: NaiveDate) -> Result<Vec<Slot>> {
        Ok(self.store.slots_for_day(location, date).await?)
    }

    async fn check_overlap(
        &self,
        location: LocationId,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        exclude: Option<SlotId>,
    ) -> Result<()> {
        let existing = self.store.slots_for_day(location, date).await?;
        for other in existing {
            if Some(other.id) == exclude || other.status == SlotStatus::Cancelled {
                continue;
            }
            if other.window_intersects(start, end) {
                return Err(Error::Overlap { existing: other.id, date });
            }
        }
        Ok(())
    }
}

fn validate_window(start: NaiveTime, end: NaiveTime) -> Result<()> {
    if start >= end {
        return Err(Error::InvalidTime {
            message: format!("start {start} must be before end {end}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::assignments::AssignmentStatus;
    use crate::errors::ErrorCode;
    use crate::test_utils::{far_future_date, slot_request, test_engine};
    use uuid::Uuid;

    #[test_log::test(tokio::test)]
    async fn create_rejects_inverted_window() {
        let engine = test_engine();
        let location = Uuid::new_v4();
        let request = slot_request(location, far_future_date(), "12:00:00", "09:00:00", 2);

        let err = engine.registry.create(request, Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidTime);
    }

    #[test_log::test(tokio::test)]
    async fn create_rejects_overlapping_window_at_same_location() {
        let engine = test_engine();
        let location = Uuid::new_v4();
        let date = far_future_date();
        let creator = Uuid::new_v4();

        engine
            .registry
            .create(slot_request(location, date, "09:00:00", "10:00:00", 2), creator)
            .await
            .unwrap();

        let err = engine
            .registry
            .create(slot_request(location, date, "09:30:00", "10:30:00", 2), creator)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Overlap);

        // Same window at another location is fine.
        engine
            .registry
            .create(slot_request(Uuid::new_v4(), date, "09:30:00", "10:30:00", 2), creator)
            .await
            .unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn create_allows_adjacent_windows() {
        let engine = test_engine();
        let location = Uuid::new_v4();
        let date = far_future_date();
        let creator = Uuid::new_v4();

        engine
            .registry
            .create(slot_request(location, date, "09:00:00", "12:00:00", 2), creator)
            .await
            .unwrap();
        engine
            .registry
            .create(slot_request(location, date, "12:00:00", "15:00:00", 2), creator)
            .await
            .unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn update_rejects_max_below_current_count() {
        let engine = test_engine();
        let location = Uuid::new_v4();
        let slot = engine
            .registry
            .create(slot_request(location, far_future_date(), "09:00:00", "12:00:00", 3), Uuid::new_v4())
            .await
            .unwrap();

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        engine.assignments.register(slot.id, a, a).await.unwrap();
        engine.assignments.register(slot.id, b, b).await.unwrap();

        let err = engine
            .registry
            .update(
                slot.id,
                SlotUpdate {
                    max_participants: Some(1),
                    ..Default::default()
                },
                Uuid::new_v4(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidMax);

        // Shrinking to exactly the current count flips the slot to full.
        let updated = engine
            .registry
            .update(
                slot.id,
                SlotUpdate {
                    max_participants: Some(2),
                    ..Default::default()
                },
                Uuid::new_v4(),
            )
            .await
            .unwrap();
        assert_eq!(updated.status, SlotStatus::Full);
    }

    #[test_log::test(tokio::test)]
    async fn update_revalidates_moved_window() {
        let engine = test_engine();
        let location = Uuid::new_v4();
        let date = far_future_date();
        let creator = Uuid::new_v4();

        let first = engine
            .registry
            .create(slot_request(location, date, "09:00:00", "12:00:00", 2), creator)
            .await
            .unwrap();
        engine
            .registry
            .create(slot_request(location, date, "13:00:00", "15:00:00", 2), creator)
            .await
            .unwrap();

        // Moving the first slot onto the second must fail.
        let err = engine
            .registry
            .update(
                first.id,
                SlotUpdate {
                    start_time: Some("13:30:00".parse().unwrap()),
                    end_time: Some("14:30:00".parse().unwrap()),
                    ..Default::default()
                },
                creator,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Overlap);

        // Moving within its own original window is not a self-overlap.
        let updated = engine
            .registry
            .update(
                first.id,
                SlotUpdate {
                    start_time: Some("09:30:00".parse().unwrap()),
                    end_time: Some("11:30:00".parse().unwrap()),
                    ..Default::default()
                },
                creator,
            )
            .await
            .unwrap();
        assert_eq!(updated.start_time, "09:30:00".parse::<chrono::NaiveTime>().unwrap());
    }

    #[test_log::test(tokio::test)]
    async fn cancel_slot_cascades_and_notifies() {
        let engine = test_engine();
        let location = Uuid::new_v4();
        let slot = engine
            .registry
            .create(slot_request(location, far_future_date(), "09:00:00", "12:00:00", 3), Uuid::new_v4())
            .await
            .unwrap();

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let waiter = Uuid::new_v4();
        engine.assignments.register(slot.id, a, a).await.unwrap();
        engine.assignments.register(slot.id, b, b).await.unwrap();
        engine.waiting.join(slot.id, waiter).await.unwrap();

        let cancelled = engine
            .registry
            .cancel_slot(slot.id, "site flooded", Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(cancelled.status, SlotStatus::Cancelled);
        assert_eq!(cancelled.current_participants, 0);

        // Assignments survive as cancelled audit rows with the reason.
        let rows = engine.store.assignments_for_slot(slot.id);
        assert_eq!(rows.len(), 2);
        assert!(rows
            .iter()
            .all(|r| r.status == AssignmentStatus::Cancelled && r.cancel_reason.as_deref() == Some("site flooded")));

        // Waiting entries are cancelled too.
        assert!(engine.store.waiting_for_slot(slot.id).iter().all(|w| w.status
            == crate::db::models::waiting_list::WaitingStatus::Cancelled));

        // One SlotCancelled notification per affected participant.
        let sent = engine.dispatcher.sent();
        let cancelled_notices: Vec<_> = sent
            .iter()
            .filter(|(_, n)| matches!(n, Notification::SlotCancelled { .. }))
            .collect();
        assert_eq!(cancelled_notices.len(), 2);

        // Terminal: no further mutation.
        let err = engine
            .registry
            .cancel_slot(slot.id, "again", Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::errors::ErrorCode::GuardClosed);
        let err = engine
            .registry
            .update(slot.id, SlotUpdate::default(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::errors::ErrorCode::GuardClosed);
    }

    #[test_log::test(tokio::test)]
    async fn get_and_list() {
        let engine = test_engine();
        let location = Uuid::new_v4();
        let date = far_future_date();
        let creator = Uuid::new_v4();

        let err = engine.registry.get(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code(), crate::errors::ErrorCode::GuardNotFound);

        let late = engine
            .registry
            .create(slot_request(location, date, "14:00:00", "16:00:00", 2), creator)
            .await
            .unwrap();
        let early = engine
            .registry
            .create(slot_request(location, date, "09:00:00", "12:00:00", 2), creator)
            .await
            .unwrap();

        assert_eq!(engine.registry.get(early.id).await.unwrap().id, early.id);
        let listed = engine.registry.list_for_day(location, date).await.unwrap();
        assert_eq!(listed.iter().map(|s| s.id).collect::<Vec<_>>(), vec![early.id, late.id]);
    }
}
