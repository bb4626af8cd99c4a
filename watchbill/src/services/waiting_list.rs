//! Waiting-list membership and promotion.

use crate::audit::{record, AuditLog};
use crate::db::models::slots::SlotStatus;
use crate::db::models::waiting_list::{WaitingEntry, WaitingStatus};
use crate::db::store::Store;
use crate::errors::{Error, Result};
use crate::notify::{dispatch_all, Notification, NotificationDispatcher};
use crate::services::assignments::AssignmentManager;
use crate::types::{abbrev_uuid, ParticipantId, SlotId};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

pub struct WaitingListManager {
    store: Arc<dyn Store>,
    assignments: Arc<AssignmentManager>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    audit: Arc<dyn AuditLog>,
}

impl WaitingListManager {
    pub fn new(
        store: Arc<dyn Store>,
        assignments: Arc<AssignmentManager>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            store,
            assignments,
            dispatcher,
            audit,
        }
    }

    /// Queue a participant for a seat. Rank comes from a monotonic
    /// sequence, so arrival order survives concurrent joins.
    #[instrument(
        skip(self),
        fields(slot = %abbrev_uuid(&slot_id), participant = %abbrev_uuid(&participant)),
        err
    )]
    pub async fn join(&self, slot_id: SlotId, participant: ParticipantId) -> Result<WaitingEntry> {
        let now = Utc::now();
        let mut tx = self.store.begin_slot(slot_id).await?.ok_or(Error::GuardNotFound(slot_id))?;

        if !tx.slot().accepts_registrations() {
            return Err(Error::GuardClosed(slot_id));
        }
        if tx.find_confirmed(participant).await?.is_some() {
            return Err(Error::AlreadyRegistered { slot: slot_id, participant });
        }
        if tx.find_waiting(participant).await?.is_some() {
            return Err(Error::AlreadyWaiting { slot: slot_id, participant });
        }

        let entry = tx.insert_waiting(participant, now).await?;
        tx.commit().await?;

        record(
            self.audit.as_ref(),
            "waiting.join",
            entry.id,
            json!({ "slot_id": slot_id, "participant_id": participant, "rank": entry.rank }),
        )
        .await;
        Ok(entry)
    }

    /// Withdraw a waiting entry. Returns `false` when the participant was
    /// not waiting.
    #[instrument(
        skip(self),
        fields(slot = %abbrev_uuid(&slot_id), participant = %abbrev_uuid(&participant)),
        err
    )]
    pub async fn leave(&self, slot_id: SlotId, participant: ParticipantId) -> Result<bool> {
        let mut tx = self.store.begin_slot(slot_id).await?.ok_or(Error::GuardNotFound(slot_id))?;

        let Some(entry) = tx.find_waiting(participant).await? else {
            return Ok(false);
        };
        tx.set_waiting_status(entry.id, WaitingStatus::Cancelled).await?;
        tx.commit().await?;

        record(
            self.audit.as_ref(),
            "waiting.leave",
            entry.id,
            json!({ "slot_id": slot_id, "participant_id": participant }),
        )
        .await;
        Ok(true)
    }

    /// Fill freed capacity from the waiting list, FIFO by rank.
    ///
    /// Each candidate is promoted in its own registration transaction; a
    /// failing candidate (lost a race, registered elsewhere in the
    /// meantime) is logged and skipped without touching prior promotions in
    /// the same call. Returns the participants actually promoted.
    #[instrument(skip(self), fields(slot = %abbrev_uuid(&slot_id)), err)]
    pub async fn promote(&self, slot_id: SlotId) -> Result<Vec<ParticipantId>> {
        let slot = self.store.get_slot(slot_id).await?.ok_or(Error::GuardNotFound(slot_id))?;
        if slot.status == SlotStatus::Cancelled || slot.status == SlotStatus::Closed {
            return Ok(Vec::new());
        }
        let available = slot.available();
        if available <= 0 {
            return Ok(Vec::new());
        }

        let candidates = self.store.waiting_entries(slot_id).await?;
        let mut promoted = Vec::new();
        for entry in candidates.into_iter().take(available as usize) {
            // Registration clears the waiting entry inside its own
            // transaction.
            match self.assignments.register(slot_id, entry.participant_id, entry.participant_id).await {
                Ok(_) => {
                    dispatch_all(
                        self.dispatcher.as_ref(),
                        vec![(entry.participant_id, Notification::WaitingListPromoted { slot_id })],
                    )
                    .await;
                    promoted.push(entry.participant_id);
                }
                Err(e) => {
                    tracing::warn!(
                        slot = %abbrev_uuid(&slot_id),
                        participant = %abbrev_uuid(&entry.participant_id),
                        rank = entry.rank,
                        error = %e,
                        "Skipping waiting-list candidate"
                    );
                }
            }
        }

        if !promoted.is_empty() {
            record(
                self.audit.as_ref(),
                "waiting.promote",
                slot_id,
                json!({ "promoted": promoted.len() }),
            )
            .await;
        }
        Ok(promoted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::assignments::{AssignmentCreate, AssignmentKind};
    use crate::errors::ErrorCode;
    use crate::services::assignments::CancelOptions;
    use crate::test_utils::{far_future_date, slot_request, test_engine};
    use uuid::Uuid;

    #[test_log::test(tokio::test)]
    async fn join_validates_and_ranks_fifo() {
        let engine = test_engine();
        let slot = engine
            .registry
            .create(slot_request(Uuid::new_v4(), far_future_date(), "09:00:00", "12:00:00", 1), Uuid::new_v4())
            .await
            .unwrap();

        let seated = Uuid::new_v4();
        engine.assignments.register(slot.id, seated, seated).await.unwrap();

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let first = engine.waiting.join(slot.id, a).await.unwrap();
        let second = engine.waiting.join(slot.id, b).await.unwrap();
        assert!(first.rank < second.rank);

        let err = engine.waiting.join(slot.id, a).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyWaiting);
        let err = engine.waiting.join(slot.id, seated).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyRegistered);
        let err = engine.waiting.join(Uuid::new_v4(), a).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::GuardNotFound);
    }

    #[test_log::test(tokio::test)]
    async fn leave_withdraws_waiting_entry() {
        let engine = test_engine();
        let slot = engine
            .registry
            .create(slot_request(Uuid::new_v4(), far_future_date(), "09:00:00", "12:00:00", 1), Uuid::new_v4())
            .await
            .unwrap();

        let a = Uuid::new_v4();
        engine.waiting.join(slot.id, a).await.unwrap();
        assert!(engine.waiting.leave(slot.id, a).await.unwrap());
        assert!(!engine.waiting.leave(slot.id, a).await.unwrap());

        // A withdrawn participant can join again with a fresh (higher) rank.
        let again = engine.waiting.join(slot.id, a).await.unwrap();
        let history = engine.store.waiting_for_slot(slot.id);
        assert_eq!(history.len(), 2);
        assert!(again.rank > history[0].rank);
    }

    #[test_log::test(tokio::test)]
    async fn promote_fills_freed_seats_in_fifo_order() {
        let engine = test_engine();
        let slot = engine
            .registry
            .create(slot_request(Uuid::new_v4(), far_future_date(), "09:00:00", "12:00:00", 2), Uuid::new_v4())
            .await
            .unwrap();

        let seated_1 = Uuid::new_v4();
        let seated_2 = Uuid::new_v4();
        engine.assignments.register(slot.id, seated_1, seated_1).await.unwrap();
        engine.assignments.register(slot.id, seated_2, seated_2).await.unwrap();

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        engine.waiting.join(slot.id, a).await.unwrap();
        engine.waiting.join(slot.id, b).await.unwrap();
        engine.waiting.join(slot.id, c).await.unwrap();

        // Nothing free yet.
        assert!(engine.waiting.promote(slot.id).await.unwrap().is_empty());

        engine
            .assignments
            .cancel(slot.id, seated_1, seated_1, CancelOptions::default())
            .await
            .unwrap();
        engine
            .assignments
            .cancel(slot.id, seated_2, seated_2, CancelOptions::default())
            .await
            .unwrap();

        let promoted = engine.waiting.promote(slot.id).await.unwrap();
        assert_eq!(promoted, vec![a, b]);

        let slot_after = engine.registry.get(slot.id).await.unwrap();
        assert_eq!(slot_after.current_participants, 2);
        assert_eq!(slot_after.status, crate::db::models::slots::SlotStatus::Full);

        // C is still waiting, A and B are marked assigned.
        let entries = engine.store.waiting_for_slot(slot.id);
        assert_eq!(
            entries.iter().filter(|e| e.status == WaitingStatus::Assigned).count(),
            2
        );
        assert!(entries
            .iter()
            .any(|e| e.participant_id == c && e.status == WaitingStatus::Waiting));

        let sent = engine.dispatcher.sent();
        assert!(sent
            .iter()
            .any(|(p, n)| *p == a && matches!(n, Notification::WaitingListPromoted { .. })));
    }

    #[test_log::test(tokio::test)]
    async fn promote_skips_failing_candidate_and_continues() {
        let engine = test_engine();
        let slot = engine
            .registry
            .create(slot_request(Uuid::new_v4(), far_future_date(), "09:00:00", "12:00:00", 2), Uuid::new_v4())
            .await
            .unwrap();

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        engine.waiting.join(slot.id, a).await.unwrap();
        engine.waiting.join(slot.id, b).await.unwrap();

        // A grabbed a seat through another path without the waiting entry
        // being cleared; their promotion attempt will fail
        // ALREADY_REGISTERED and must not block B's.
        let mut tx = engine.store.begin_slot(slot.id).await.unwrap().unwrap();
        tx.insert_assignment(
            &AssignmentCreate {
                slot_id: slot.id,
                participant_id: a,
                assigned_by: a,
                kind: AssignmentKind::Voluntary,
            },
            chrono::Utc::now(),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let promoted = engine.waiting.promote(slot.id).await.unwrap();
        assert_eq!(promoted, vec![b]);
    }

    #[test_log::test(tokio::test)]
    async fn promote_on_cancelled_slot_is_a_noop() {
        let engine = test_engine();
        let slot = engine
            .registry
            .create(slot_request(Uuid::new_v4(), far_future_date(), "09:00:00", "12:00:00", 2), Uuid::new_v4())
            .await
            .unwrap();
        engine.waiting.join(slot.id, Uuid::new_v4()).await.unwrap();
        engine.registry.cancel_slot(slot.id, "cancelled", Uuid::new_v4()).await.unwrap();

        assert!(engine.waiting.promote(slot.id).await.unwrap().is_empty());
    }
}
