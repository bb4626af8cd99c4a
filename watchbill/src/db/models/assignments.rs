//! Database models for slot assignments.
//!
//! Cancelled assignments are never deleted; they are the audit trail of who
//! held (and gave up) which seat.

use crate::types::{AssignmentId, ParticipantId, SlotId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Confirmed,
    Cancelled,
}

/// Whether the participant took the seat themselves or was placed by a
/// delegate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AssignmentKind {
    Voluntary,
    Assigned,
}

/// Link between a participant and a slot.
///
/// At most one `Confirmed` row exists per (slot, participant) pair. A row
/// is immutable once cancelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Assignment {
    pub id: AssignmentId,
    pub slot_id: SlotId,
    pub participant_id: ParticipantId,
    pub assigned_by: ParticipantId,
    pub kind: AssignmentKind,
    pub status: AssignmentStatus,
    pub created_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub replacement_participant_id: Option<ParticipantId>,
    pub replacement_deadline: Option<DateTime<Utc>>,
}

/// Request for inserting a confirmed assignment.
#[derive(Debug, Clone)]
pub struct AssignmentCreate {
    pub slot_id: SlotId,
    pub participant_id: ParticipantId,
    pub assigned_by: ParticipantId,
    pub kind: AssignmentKind,
}

/// Terminal fields stamped onto an assignment at cancellation.
#[derive(Debug, Clone)]
pub struct AssignmentCancellation {
    pub cancelled_at: DateTime<Utc>,
    pub reason: String,
    pub replacement_participant_id: Option<ParticipantId>,
    pub replacement_deadline: Option<DateTime<Utc>>,
}
