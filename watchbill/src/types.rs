//! Common type definitions shared across the engine.
//!
//! All entity IDs are UUIDs wrapped in type aliases:
//!
//! - [`SlotId`]: guard slot identifier
//! - [`ParticipantId`]: person assignable to a slot
//! - [`LocationId`]: location a slot covers
//! - [`ScenarioId`]: recurring-schedule template identifier
//! - [`AssignmentId`] / [`WaitingEntryId`]: record identifiers

use uuid::Uuid;

// Type aliases for IDs
pub type SlotId = Uuid;
pub type ParticipantId = Uuid;
pub type LocationId = Uuid;
pub type ScenarioId = Uuid;
pub type AssignmentId = Uuid;
pub type WaitingEntryId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}
