//! Database models for the per-slot waiting list.

use crate::types::{ParticipantId, SlotId, WaitingEntryId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WaitingStatus {
    Waiting,
    Assigned,
    Cancelled,
}

/// A participant queued for a seat on a slot.
///
/// `rank` comes from a monotonic sequence; promotion drains entries in rank
/// order, which preserves FIFO arrival order. At most one `Waiting` entry
/// exists per (slot, participant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WaitingEntry {
    pub id: WaitingEntryId,
    pub slot_id: SlotId,
    pub participant_id: ParticipantId,
    pub rank: i64,
    pub status: WaitingStatus,
    pub created_at: DateTime<Utc>,
}
