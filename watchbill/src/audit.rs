//! Audit trail port.
//!
//! Appends are best-effort: a failing audit backend must never fail or
//! delay the business operation, so [`record`] swallows errors with a warn
//! log. Like notifications, audit writes happen after commit.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

/// Append-only audit sink (external collaborator).
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, action: &str, entity_id: Uuid, details: Value) -> anyhow::Result<()>;
}

/// Append an audit entry, swallowing backend failures.
pub async fn record(log: &dyn AuditLog, action: &str, entity_id: Uuid, details: Value) {
    if let Err(e) = log.append(action, entity_id, details).await {
        tracing::warn!(action, entity = %crate::types::abbrev_uuid(&entity_id), error = %e, "Audit append failed");
    }
}

/// Audit sink that writes structured log events only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLog;

#[async_trait]
impl AuditLog for TracingAuditLog {
    async fn append(&self, action: &str, entity_id: Uuid, details: Value) -> anyhow::Result<()> {
        tracing::info!(action, entity = %entity_id, %details, "audit");
        Ok(())
    }
}
