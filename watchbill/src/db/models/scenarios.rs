//! Database models for recurring-schedule templates.

use crate::db::models::slots::SlotType;
use crate::types::{LocationId, ParticipantId, ScenarioId};
use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A weekly template from which concrete slots are generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ScenarioTemplate {
    pub id: ScenarioId,
    pub name: String,
    pub location_id: LocationId,
    pub active: bool,
    pub created_by: ParticipantId,
    pub created_at: DateTime<Utc>,
}

/// One slot shape within a template, bound to a weekday. A weekday with no
/// template slots is a disabled weekday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TemplateSlot {
    pub id: Uuid,
    pub scenario_id: ScenarioId,
    /// 0 = Monday .. 6 = Sunday, matching `Weekday::num_days_from_monday`.
    pub weekday: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_type: SlotType,
    pub min_participants: i32,
    pub max_participants: i32,
    pub priority: i32,
}

impl TemplateSlot {
    pub fn applies_on(&self, weekday: Weekday) -> bool {
        i32::from(self.weekday) == weekday.num_days_from_monday() as i32
    }
}
