//! Recurring-slot generation from weekly templates.

use crate::db::models::slots::{Slot, SlotCreate};
use crate::db::store::Store;
use crate::errors::{Error, Result};
use crate::services::slot_registry::SlotRegistry;
use crate::types::{abbrev_uuid, ParticipantId, ScenarioId};
use chrono::{Datelike, NaiveDate};
use std::sync::Arc;
use tracing::instrument;

pub struct ScenarioExpander {
    store: Arc<dyn Store>,
    registry: Arc<SlotRegistry>,
}

impl ScenarioExpander {
    pub fn new(store: Arc<dyn Store>, registry: Arc<SlotRegistry>) -> Self {
        Self { store, registry }
    }

    /// Materialize a template over `[from, to]` (inclusive).
    ///
    /// Per-slot `OVERLAP` failures are swallowed so re-running an expansion
    /// over an already covered range is idempotent; any other failure
    /// aborts and propagates.
    #[instrument(skip(self), fields(scenario = %abbrev_uuid(&scenario_id)), err)]
    pub async fn expand(
        &self,
        scenario_id: ScenarioId,
        from: NaiveDate,
        to: NaiveDate,
        creator: ParticipantId,
    ) -> Result<Vec<Slot>> {
        let scenario = self
            .store
            .get_scenario(scenario_id)
            .await?
            .filter(|s| s.active)
            .ok_or(Error::ScenarioNotFound(scenario_id))?;

        if from > to {
            return Err(Error::InvalidTime {
                message: format!("range start {from} is after range end {to}"),
            });
        }

        let templates = self.store.template_slots(scenario_id).await?;
        let mut created = Vec::new();
        let mut day = from;
        loop {
            for template in templates.iter().filter(|t| t.applies_on(day.weekday())) {
                let request = SlotCreate {
                    location_id: scenario.location_id,
                    date: day,
                    start_time: template.start_time,
                    end_time: template.end_time,
                    slot_type: template.slot_type,
                    min_participants: template.min_participants,
                    max_participants: template.max_participants,
                    priority: template.priority,
                    scenario_id: Some(scenario_id),
                };
                match self.registry.create(request, creator).await {
                    Ok(slot) => created.push(slot),
                    Err(Error::Overlap { existing, .. }) => {
                        tracing::debug!(
                            date = %day,
                            existing = %abbrev_uuid(&existing),
                            "Window already covered, skipping template slot"
                        );
                    }
                    Err(e) => return Err(e),
                }
            }
            if day >= to {
                break;
            }
            day = day
                .succ_opt()
                .ok_or_else(|| Error::Other(anyhow::anyhow!("date overflow past {day}")))?;
        }

        tracing::info!(
            scenario = %abbrev_uuid(&scenario_id),
            from = %from,
            to = %to,
            created = created.len(),
            "Expanded scenario"
        );
        Ok(created)
    }
}
