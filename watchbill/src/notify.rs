//! Notification port.
//!
//! The engine never delivers anything itself; it hands typed events to a
//! [`NotificationDispatcher`] strictly after the owning transaction has
//! committed. Delivery failures are warn-logged and never surface to the
//! business operation, matching the at-most-effort contract: durable
//! delivery, channels and retries belong to the notification subsystem.

use crate::classify::Urgency;
use crate::types::{ParticipantId, SlotId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Events the engine emits. Serializable so dispatchers can forward the
/// payload unchanged to whatever channel they drive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    /// Participant holds a confirmed seat on the slot.
    RegistrationConfirmed { slot_id: SlotId },
    /// The whole slot was cancelled; the recipient had a confirmed seat.
    SlotCancelled { slot_id: SlotId, reason: String },
    /// The recipient was proposed as a replacement and must respond by the
    /// deadline.
    ReplacementRequested {
        slot_id: SlotId,
        cancelled_by: ParticipantId,
        respond_by: DateTime<Utc>,
    },
    /// A cancellation close to the slot start; sent to privileged roles in
    /// the slot's location scope.
    CancellationEscalation {
        slot_id: SlotId,
        participant_id: ParticipantId,
        urgency: Urgency,
    },
    /// The recipient was moved from the waiting list into a confirmed seat.
    WaitingListPromoted { slot_id: SlotId },
}

/// Delivery port (external collaborator). Implementations must not block on
/// slow channels; the engine awaits them outside any lock but within the
/// calling task.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, participant: ParticipantId, notification: Notification) -> anyhow::Result<()>;
}

/// Send a batch of post-commit notifications, logging failures instead of
/// propagating them.
pub async fn dispatch_all(dispatcher: &dyn NotificationDispatcher, batch: Vec<(ParticipantId, Notification)>) {
    for (participant, notification) in batch {
        if let Err(e) = dispatcher.notify(participant, notification.clone()).await {
            tracing::warn!(
                participant = %crate::types::abbrev_uuid(&participant),
                error = %e,
                ?notification,
                "Failed to dispatch notification"
            );
        }
    }
}

/// Dispatcher that only logs. Useful as a default and in deployments where
/// delivery is wired up out of process.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDispatcher;

#[async_trait]
impl NotificationDispatcher for TracingDispatcher {
    async fn notify(&self, participant: ParticipantId, notification: Notification) -> anyhow::Result<()> {
        tracing::info!(
            participant = %crate::types::abbrev_uuid(&participant),
            payload = %serde_json::to_string(&notification).unwrap_or_default(),
            "notification"
        );
        Ok(())
    }
}
