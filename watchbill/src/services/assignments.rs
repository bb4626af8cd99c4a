//! Registration and cancellation of participants on slots.
//!
//! The concurrency-critical core. Both operations run inside a slot-scoped
//! serialized transaction: two callers racing for the last seat are
//! serialized by the store, exactly one commits the seat-taking write and
//! the other observes `GUARD_FULL` (or a serialization conflict it must
//! retry itself). Notifications go out strictly after commit, never under
//! the slot lock.

use crate::audit::{record, AuditLog};
use crate::classify::{classify, Urgency};
use crate::config::PolicyConfig;
use crate::db::models::assignments::{Assignment, AssignmentCancellation, AssignmentCreate, AssignmentKind};
use crate::db::models::slots::Slot;
use crate::db::models::waiting_list::WaitingStatus;
use crate::db::store::Store;
use crate::errors::{Error, Result};
use crate::notify::{dispatch_all, Notification, NotificationDispatcher};
use crate::roles::{can_assign, Directory, Role};
use crate::types::{abbrev_uuid, ParticipantId, SlotId};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

/// Result of a successful registration.
#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    pub assignment: Assignment,
    pub slot: Slot,
}

/// Result of a successful cancellation.
#[derive(Debug, Clone)]
pub struct CancellationOutcome {
    pub urgency: Urgency,
    pub assignment: Assignment,
    pub slot: Slot,
}

/// Caller-supplied cancellation details.
#[derive(Debug, Clone, Default)]
pub struct CancelOptions {
    pub reason: String,
    pub replacement_participant_id: Option<ParticipantId>,
}

pub struct AssignmentManager {
    store: Arc<dyn Store>,
    directory: Arc<dyn Directory>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    audit: Arc<dyn AuditLog>,
    policy: PolicyConfig,
}

impl AssignmentManager {
    pub fn new(
        store: Arc<dyn Store>,
        directory: Arc<dyn Directory>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        audit: Arc<dyn AuditLog>,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            store,
            directory,
            dispatcher,
            audit,
            policy,
        }
    }

    /// Register `participant` on a slot. `assigner` is the participant
    /// themselves (voluntary) or a delegate, who must pass the role
    /// predicate.
    #[instrument(
        skip(self),
        fields(slot = %abbrev_uuid(&slot_id), participant = %abbrev_uuid(&participant)),
        err
    )]
    pub async fn register(&self, slot_id: SlotId, participant: ParticipantId, assigner: ParticipantId) -> Result<RegistrationOutcome> {
        // Directory lookups happen before taking the slot lock; role data is
        // not slot state and must not extend the lock hold time.
        let delegate_roles = if assigner != participant {
            let assigner_info = self
                .directory
                .role_of(assigner)
                .await
                .map_err(Error::Other)?
                .ok_or(Error::UserNotFound(assigner))?;
            let target_info = self
                .directory
                .role_of(participant)
                .await
                .map_err(Error::Other)?
                .ok_or(Error::UserNotFound(participant))?;
            Some((assigner_info, target_info))
        } else {
            None
        };

        let now = Utc::now();
        let mut tx = self.store.begin_slot(slot_id).await?.ok_or(Error::GuardNotFound(slot_id))?;
        let mut slot = tx.slot().clone();

        if !slot.accepts_registrations() {
            return Err(Error::GuardClosed(slot_id));
        }
        if slot.current_participants >= slot.max_participants {
            return Err(Error::GuardFull(slot_id));
        }
        if tx.find_confirmed(participant).await?.is_some() {
            return Err(Error::AlreadyRegistered { slot: slot_id, participant });
        }
        if let Some((assigner_info, target_info)) = &delegate_roles {
            if !can_assign(assigner_info, target_info) {
                return Err(Error::PermissionDenied {
                    assigner,
                    target: participant,
                });
            }
        }

        let kind = if assigner == participant {
            AssignmentKind::Voluntary
        } else {
            AssignmentKind::Assigned
        };
        let assignment = tx
            .insert_assignment(
                &AssignmentCreate {
                    slot_id,
                    participant_id: participant,
                    assigned_by: assigner,
                    kind,
                },
                now,
            )
            .await?;

        slot.current_participants += 1;
        slot.recompute_status();
        slot.updated_at = now;
        tx.store_slot(&slot).await?;

        if let Some(entry) = tx.find_waiting(participant).await? {
            tx.set_waiting_status(entry.id, WaitingStatus::Assigned).await?;
        }

        tx.commit().await?;

        dispatch_all(
            self.dispatcher.as_ref(),
            vec![(participant, Notification::RegistrationConfirmed { slot_id })],
        )
        .await;
        record(
            self.audit.as_ref(),
            "assignment.register",
            assignment.id,
            json!({ "slot_id": slot_id, "participant_id": participant, "assigned_by": assigner }),
        )
        .await;

        Ok(RegistrationOutcome { assignment, slot })
    }

    /// Cancel a participant's confirmed assignment, classify the urgency
    /// and stamp an optional replacement proposal with its response
    /// deadline.
    #[instrument(
        skip(self, opts),
        fields(slot = %abbrev_uuid(&slot_id), participant = %abbrev_uuid(&participant)),
        err
    )]
    pub async fn cancel(
        &self,
        slot_id: SlotId,
        participant: ParticipantId,
        canceller: ParticipantId,
        opts: CancelOptions,
    ) -> Result<CancellationOutcome> {
        // One captured timestamp per operation: urgency and the replacement
        // deadline must not drift apart between two clock reads.
        let now = Utc::now();

        let mut tx = self.store.begin_slot(slot_id).await?.ok_or(Error::GuardNotFound(slot_id))?;
        let mut slot = tx.slot().clone();

        let assignment = tx
            .find_confirmed(participant)
            .await?
            .ok_or(Error::AssignmentNotFound { slot: slot_id, participant })?;

        let urgency = classify(slot.starts_at(), now, &self.policy);
        let replacement_deadline = opts.replacement_participant_id.map(|_| {
            let window = self.policy.replacement_window(slot.starts_at() - now);
            now + chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::hours(1))
        });

        let cancelled = tx
            .cancel_assignment(
                assignment.id,
                &AssignmentCancellation {
                    cancelled_at: now,
                    reason: opts.reason.clone(),
                    replacement_participant_id: opts.replacement_participant_id,
                    replacement_deadline,
                },
            )
            .await?;

        slot.current_participants = (slot.current_participants - 1).max(0);
        slot.recompute_status();
        slot.updated_at = now;
        tx.store_slot(&slot).await?;
        tx.commit().await?;

        let mut batch = Vec::new();
        if let (Some(replacement), Some(respond_by)) = (opts.replacement_participant_id, replacement_deadline) {
            batch.push((
                replacement,
                Notification::ReplacementRequested {
                    slot_id,
                    cancelled_by: participant,
                    respond_by,
                },
            ));
        }
        if let Some(min_role) = escalation_floor(urgency) {
            match self.directory.privileged_in_scope(slot.location_id, min_role).await {
                Ok(recipients) => {
                    for recipient in recipients {
                        batch.push((
                            recipient,
                            Notification::CancellationEscalation {
                                slot_id,
                                participant_id: participant,
                                urgency,
                            },
                        ));
                    }
                }
                // Escalation is part of the post-commit fan-out; a directory
                // outage must not fail the committed cancellation.
                Err(e) => {
                    tracing::warn!(slot = %abbrev_uuid(&slot_id), error = %e, "Failed to resolve escalation recipients");
                }
            }
        }
        dispatch_all(self.dispatcher.as_ref(), batch).await;

        record(
            self.audit.as_ref(),
            "assignment.cancel",
            cancelled.id,
            json!({
                "slot_id": slot_id,
                "participant_id": participant,
                "cancelled_by": canceller,
                "urgency": urgency,
                "reason": opts.reason,
            }),
        )
        .await;

        Ok(CancellationOutcome {
            urgency,
            assignment: cancelled,
            slot,
        })
    }
}

/// Who gets alerted after a cancellation: LATE reaches every privileged
/// role in the location scope, ANTICIPATED only the narrower
/// location-manager subset, NORMAL nobody.
fn escalation_floor(urgency: Urgency) -> Option<Role> {
    match urgency {
        Urgency::Late => Some(Role::Coordinator),
        Urgency::Anticipated => Some(Role::LocationManager),
        Urgency::Normal => None,
    }
}
