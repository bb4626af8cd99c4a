//! Shared helpers for the test suite.
//!
//! Wires the full service stack over a [`MemoryStore`] with a recording
//! notification dispatcher and a static in-memory directory. Public so
//! integration tests (and downstream crates embedding the engine) can reuse
//! the builders.

use crate::audit::TracingAuditLog;
use crate::config::PolicyConfig;
use crate::db::memory::MemoryStore;
use crate::db::models::slots::{SlotCreate, SlotType};
use crate::notify::{Notification, NotificationDispatcher};
use crate::roles::{Directory, Role, RoleInfo};
use crate::services::{AssignmentManager, ScenarioExpander, SlotRegistry, WaitingListManager};
use crate::types::{LocationId, ParticipantId};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Dispatcher that records every notification instead of delivering it.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<(ParticipantId, Notification)>>,
}

impl RecordingDispatcher {
    pub fn sent(&self) -> Vec<(ParticipantId, Notification)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn notify(&self, participant: ParticipantId, notification: Notification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push((participant, notification));
        Ok(())
    }
}

/// Directory backed by a fixed role table.
#[derive(Default)]
pub struct StaticDirectory {
    roles: Mutex<HashMap<ParticipantId, RoleInfo>>,
}

impl StaticDirectory {
    pub fn insert(&self, participant: ParticipantId, info: RoleInfo) {
        self.roles.lock().unwrap().insert(participant, info);
    }

    /// Register a participant with a role scoped to a location, returning
    /// the new id.
    pub fn add(&self, role: Role, location: LocationId) -> ParticipantId {
        let id = Uuid::new_v4();
        self.insert(
            id,
            RoleInfo {
                role,
                location_scope: Some(location),
                group_id: None,
            },
        );
        id
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn role_of(&self, participant: ParticipantId) -> anyhow::Result<Option<RoleInfo>> {
        Ok(self.roles.lock().unwrap().get(&participant).cloned())
    }

    async fn privileged_in_scope(&self, location: LocationId, min_role: Role) -> anyhow::Result<Vec<ParticipantId>> {
        let mut out: Vec<ParticipantId> = self
            .roles
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, info)| info.location_scope == Some(location) && info.role.level() >= min_role.level())
            .map(|(id, _)| *id)
            .collect();
        out.sort();
        Ok(out)
    }
}

/// Fully wired engine over a [`MemoryStore`].
pub struct TestEngine {
    pub store: MemoryStore,
    pub registry: Arc<SlotRegistry>,
    pub assignments: Arc<AssignmentManager>,
    pub waiting: Arc<WaitingListManager>,
    pub expander: Arc<ScenarioExpander>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub directory: Arc<StaticDirectory>,
}

pub fn test_engine() -> TestEngine {
    test_engine_with_policy(PolicyConfig::default())
}

pub fn test_engine_with_policy(policy: PolicyConfig) -> TestEngine {
    let store = MemoryStore::new();
    let store_port: Arc<dyn crate::db::store::Store> = Arc::new(store.clone());
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let directory = Arc::new(StaticDirectory::default());
    let audit = Arc::new(TracingAuditLog);

    let registry = Arc::new(SlotRegistry::new(
        Arc::clone(&store_port),
        dispatcher.clone() as Arc<dyn NotificationDispatcher>,
        audit.clone() as Arc<dyn crate::audit::AuditLog>,
    ));
    let assignments = Arc::new(AssignmentManager::new(
        Arc::clone(&store_port),
        directory.clone() as Arc<dyn Directory>,
        dispatcher.clone() as Arc<dyn NotificationDispatcher>,
        audit.clone() as Arc<dyn crate::audit::AuditLog>,
        policy,
    ));
    let waiting = Arc::new(WaitingListManager::new(
        Arc::clone(&store_port),
        Arc::clone(&assignments),
        dispatcher.clone() as Arc<dyn NotificationDispatcher>,
        audit.clone() as Arc<dyn crate::audit::AuditLog>,
    ));
    let expander = Arc::new(ScenarioExpander::new(Arc::clone(&store_port), Arc::clone(&registry)));

    TestEngine {
        store,
        registry,
        assignments,
        waiting,
        expander,
        dispatcher,
        directory,
    }
}

/// Slot creation request with sensible test defaults.
pub fn slot_request(location: LocationId, date: NaiveDate, start: &str, end: &str, max: i32) -> SlotCreate {
    SlotCreate {
        location_id: location,
        date,
        start_time: start.parse().expect("valid start time"),
        end_time: end.parse().expect("valid end time"),
        slot_type: SlotType::Regular,
        min_participants: 1,
        max_participants: max,
        priority: 0,
        scenario_id: None,
    }
}

/// A date far enough out that cancellations classify as NORMAL.
pub fn far_future_date() -> NaiveDate {
    (chrono::Utc::now() + chrono::Duration::days(30)).date_naive()
}
