//! Role hierarchy and the delegate-assignment predicate.
//!
//! The directory service owns who holds which role; the engine only needs a
//! numeric ordering between roles and a pure predicate deciding whether one
//! participant may register another onto a slot. Keeping the predicate pure
//! keeps the authorization rule testable without a directory backend.

use crate::types::{LocationId, ParticipantId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Roles ordered by authority. The numeric level is the only thing the
/// engine compares; gaps leave room for new roles without renumbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Guard,
    Coordinator,
    LocationManager,
    Admin,
}

impl Role {
    pub fn level(self) -> u8 {
        match self {
            Role::Guard => 10,
            Role::Coordinator => 20,
            Role::LocationManager => 30,
            Role::Admin => 40,
        }
    }
}

/// Directory record for a participant, as far as the engine cares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleInfo {
    pub role: Role,
    pub location_scope: Option<LocationId>,
    pub group_id: Option<Uuid>,
}

/// May `assigner` register `target` onto a slot on their behalf?
///
/// Allowed when the assigner strictly outranks the target, or when both
/// share a location scope and the assigner holds at least coordinator
/// authority there. Self-assignment never reaches this predicate.
pub fn can_assign(assigner: &RoleInfo, target: &RoleInfo) -> bool {
    if assigner.role.level() > target.role.level() {
        return true;
    }
    match (assigner.location_scope, target.location_scope) {
        (Some(a), Some(t)) if a == t => assigner.role.level() >= Role::Coordinator.level(),
        _ => false,
    }
}

/// Read-only port onto the directory service (external collaborator).
#[async_trait]
pub trait Directory: Send + Sync {
    /// Role record for a participant, `None` if the directory has no entry.
    async fn role_of(&self, participant: ParticipantId) -> anyhow::Result<Option<RoleInfo>>;

    /// Participants holding `min_role` or above within a location scope.
    /// Used to resolve escalation recipients after urgent cancellations.
    async fn privileged_in_scope(&self, location: LocationId, min_role: Role) -> anyhow::Result<Vec<ParticipantId>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(role: Role, scope: Option<LocationId>) -> RoleInfo {
        RoleInfo {
            role,
            location_scope: scope,
            group_id: None,
        }
    }

    #[test]
    fn outranking_assigner_allowed_across_scopes() {
        let site_a = Uuid::new_v4();
        let site_b = Uuid::new_v4();
        let manager = info(Role::LocationManager, Some(site_a));
        let guard = info(Role::Guard, Some(site_b));
        assert!(can_assign(&manager, &guard));
    }

    #[test]
    fn equal_rank_needs_shared_scope_and_coordinator_level() {
        let site = Uuid::new_v4();
        let coord_a = info(Role::Coordinator, Some(site));
        let coord_b = info(Role::Coordinator, Some(site));
        assert!(can_assign(&coord_a, &coord_b));

        let guard_a = info(Role::Guard, Some(site));
        let guard_b = info(Role::Guard, Some(site));
        assert!(!can_assign(&guard_a, &guard_b));
    }

    #[test]
    fn lower_rank_never_assigns_upward() {
        let site = Uuid::new_v4();
        let guard = info(Role::Guard, Some(site));
        let manager = info(Role::LocationManager, Some(site));
        assert!(!can_assign(&guard, &manager));
    }

    #[test]
    fn missing_scope_blocks_peer_assignment() {
        let coord_a = info(Role::Coordinator, None);
        let coord_b = info(Role::Coordinator, Some(Uuid::new_v4()));
        assert!(!can_assign(&coord_a, &coord_b));
    }

    #[test]
    fn admin_outranks_everyone() {
        let admin = info(Role::Admin, None);
        let manager = info(Role::LocationManager, Some(Uuid::new_v4()));
        assert!(can_assign(&admin, &manager));
    }
}
