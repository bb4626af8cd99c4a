//! Service-level error type and the stable error codes exposed to boundary
//! layers.
//!
//! The engine has no transport layer of its own; callers (HTTP routers,
//! schedulers, CLI tools) map [`ErrorCode`] to whatever status scheme they
//! use. Codes are part of the public contract and must stay stable.

use crate::db::errors::DbError;
use crate::types::{ParticipantId, SlotId};
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error as ThisError;

/// Stable machine-readable error codes for boundary-layer mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    GuardNotFound,
    GuardClosed,
    GuardFull,
    AlreadyRegistered,
    AlreadyWaiting,
    Overlap,
    InvalidTime,
    InvalidMax,
    PermissionDenied,
    AssignmentNotFound,
    ScenarioNotFound,
    UserNotFound,
    Conflict,
    Internal,
}

#[derive(ThisError, Debug)]
pub enum Error {
    /// Slot does not exist
    #[error("Guard slot {0} not found")]
    GuardNotFound(SlotId),

    /// Slot exists but is closed or cancelled and accepts no mutation
    #[error("Guard slot {0} is closed")]
    GuardClosed(SlotId),

    /// Slot is at capacity
    #[error("Guard slot {0} is full")]
    GuardFull(SlotId),

    /// Participant already holds a confirmed assignment on this slot
    #[error("Participant {participant} is already registered on slot {slot}")]
    AlreadyRegistered { slot: SlotId, participant: ParticipantId },

    /// Participant already has a waiting entry on this slot
    #[error("Participant {participant} is already on the waiting list of slot {slot}")]
    AlreadyWaiting { slot: SlotId, participant: ParticipantId },

    /// New time window intersects an existing non-cancelled slot
    #[error("Time window overlaps slot {existing} at the same location on {date}")]
    Overlap { existing: SlotId, date: NaiveDate },

    /// Start is not strictly before end
    #[error("Invalid time window: {message}")]
    InvalidTime { message: String },

    /// Requested max_participants is below the current confirmed count
    #[error("max_participants {requested} is below current participant count {current}")]
    InvalidMax { requested: i32, current: i32 },

    /// Delegate assignment refused by the role predicate
    #[error("{assigner} may not assign {target}")]
    PermissionDenied { assigner: ParticipantId, target: ParticipantId },

    /// No confirmed assignment for this (slot, participant) pair
    #[error("No confirmed assignment for participant {participant} on slot {slot}")]
    AssignmentNotFound { slot: SlotId, participant: ParticipantId },

    /// Scenario template missing or inactive
    #[error("Scenario {0} not found")]
    ScenarioNotFound(crate::types::ScenarioId),

    /// Directory has no record for a participant involved in the operation
    #[error("Participant {0} not known to the directory")]
    UserNotFound(ParticipantId),

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Stable code for transport-layer mapping.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::GuardNotFound(_) => ErrorCode::GuardNotFound,
            Error::GuardClosed(_) => ErrorCode::GuardClosed,
            Error::GuardFull(_) => ErrorCode::GuardFull,
            Error::AlreadyRegistered { .. } => ErrorCode::AlreadyRegistered,
            Error::AlreadyWaiting { .. } => ErrorCode::AlreadyWaiting,
            Error::Overlap { .. } => ErrorCode::Overlap,
            Error::InvalidTime { .. } => ErrorCode::InvalidTime,
            Error::InvalidMax { .. } => ErrorCode::InvalidMax,
            Error::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            Error::AssignmentNotFound { .. } => ErrorCode::AssignmentNotFound,
            Error::ScenarioNotFound(_) => ErrorCode::ScenarioNotFound,
            Error::UserNotFound(_) => ErrorCode::UserNotFound,
            Error::Database(DbError::NotFound) => ErrorCode::GuardNotFound,
            Error::Database(DbError::UniqueViolation { .. }) | Error::Database(DbError::SerializationConflict { .. }) => {
                ErrorCode::Conflict
            }
            Error::Database(_) | Error::Other(_) => ErrorCode::Internal,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { .. } => "Resource already exists".to_string(),
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::SerializationConflict { .. } => "Conflicting concurrent update, please retry".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
