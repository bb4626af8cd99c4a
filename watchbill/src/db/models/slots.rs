//! Database models for guard slots.

use crate::types::{LocationId, ParticipantId, ScenarioId, SlotId};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Slot lifecycle status, stored as TEXT in the database.
///
/// A derived projection of the participant counter against the capacity
/// bounds. `Cancelled` is terminal and overrides everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Open,
    Full,
    Closed,
    Cancelled,
}

/// Kind of coverage the slot represents, stored as TEXT in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SlotType {
    Regular,
    Night,
    Event,
}

/// A schedulable coverage window at a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Slot {
    pub id: SlotId,
    pub location_id: LocationId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_type: SlotType,
    pub min_participants: i32,
    pub max_participants: i32,
    /// Cached count of confirmed assignments. Mutated only under the slot
    /// lock; always within `0..=max_participants`.
    pub current_participants: i32,
    pub status: SlotStatus,
    pub priority: i32,
    pub scenario_id: Option<ScenarioId>,
    pub created_by: ParticipantId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Slot {
    /// Slot start as a UTC instant. Slot-local times are interpreted as UTC;
    /// time-zone handling belongs to the boundary layer.
    pub fn starts_at(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.date.and_time(self.start_time))
    }

    /// Seats still open.
    pub fn available(&self) -> i32 {
        (self.max_participants - self.current_participants).max(0)
    }

    pub fn accepts_registrations(&self) -> bool {
        matches!(self.status, SlotStatus::Open | SlotStatus::Full)
    }

    /// Re-derive status from the counter. No-op on a cancelled slot.
    pub fn recompute_status(&mut self) {
        if self.status == SlotStatus::Cancelled {
            return;
        }
        self.status = if self.current_participants >= self.max_participants {
            SlotStatus::Full
        } else {
            SlotStatus::Open
        };
    }

    /// Does `[start, end)` intersect this slot's window? Covers the three
    /// cases: the other window starts inside ours, ends inside ours, or
    /// encloses ours.
    pub fn window_intersects(&self, start: NaiveTime, end: NaiveTime) -> bool {
        let starts_inside = start >= self.start_time && start < self.end_time;
        let ends_inside = end > self.start_time && end <= self.end_time;
        let encloses = start <= self.start_time && end >= self.end_time;
        starts_inside || ends_inside || encloses
    }
}

/// Request for creating a new slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotCreate {
    pub location_id: LocationId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_type: SlotType,
    pub min_participants: i32,
    pub max_participants: i32,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub scenario_id: Option<ScenarioId>,
}

/// Patch for an existing slot. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlotUpdate {
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub slot_type: Option<SlotType>,
    pub min_participants: Option<i32>,
    pub max_participants: Option<i32>,
    pub priority: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn slot(start: &str, end: &str) -> Slot {
        Slot {
            id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            start_time: start.parse().unwrap(),
            end_time: end.parse().unwrap(),
            slot_type: SlotType::Regular,
            min_participants: 1,
            max_participants: 2,
            current_participants: 0,
            status: SlotStatus::Open,
            priority: 0,
            scenario_id: None,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn window_intersection_cases() {
        let existing = slot("09:00:00", "12:00:00");

        // New starts inside existing
        assert!(existing.window_intersects("10:00:00".parse().unwrap(), "13:00:00".parse().unwrap()));
        // New ends inside existing
        assert!(existing.window_intersects("08:00:00".parse().unwrap(), "10:00:00".parse().unwrap()));
        // New encloses existing
        assert!(existing.window_intersects("08:00:00".parse().unwrap(), "13:00:00".parse().unwrap()));
        // New inside existing (both boundaries interior)
        assert!(existing.window_intersects("10:00:00".parse().unwrap(), "11:00:00".parse().unwrap()));
    }

    #[test]
    fn adjacent_windows_do_not_intersect() {
        let existing = slot("09:00:00", "12:00:00");
        assert!(!existing.window_intersects("12:00:00".parse().unwrap(), "14:00:00".parse().unwrap()));
        assert!(!existing.window_intersects("07:00:00".parse().unwrap(), "09:00:00".parse().unwrap()));
    }

    #[test]
    fn status_projection_tracks_counter() {
        let mut s = slot("09:00:00", "12:00:00");
        s.current_participants = 2;
        s.recompute_status();
        assert_eq!(s.status, SlotStatus::Full);

        s.current_participants = 1;
        s.recompute_status();
        assert_eq!(s.status, SlotStatus::Open);

        s.status = SlotStatus::Cancelled;
        s.recompute_status();
        assert_eq!(s.status, SlotStatus::Cancelled);
    }

    #[test]
    fn starts_at_combines_date_and_time() {
        let s = slot("09:00:00", "12:00:00");
        assert_eq!(s.starts_at().to_rfc3339(), "2024-06-01T09:00:00+00:00");
    }
}
