//! # watchbill: slot assignment and waiting-list engine
//!
//! `watchbill` coordinates assignment of people to time-bounded coverage
//! slots ("guards") at locations, under capacity limits, with a FIFO
//! waiting list and a cancellation policy driven by how close the slot is
//! to starting.
//!
//! ## What it does
//!
//! A slot is a coverage window at a location needing between `min` and
//! `max` participants. Participants register onto slots (themselves, or
//! placed by an outranking delegate) until capacity is reached; further
//! requests queue on a waiting list. Cancellations are classified by
//! urgency — NORMAL, ANTICIPATED or LATE depending on time remaining
//! before the slot starts — which drives escalation to privileged roles
//! and the response deadline granted to a proposed replacement. Freed
//! capacity is refilled from the waiting list in arrival order. Recurring
//! schedules are generated from weekly scenario templates, idempotently:
//! re-expanding an already covered range is a no-op.
//!
//! ## Architecture
//!
//! Services are constructed with injected ports rather than global state:
//!
//! - [`db::store::Store`] / [`db::store::SlotTx`] — persistence.
//!   [`db::postgres::PgStore`] runs every slot-mutating operation in a
//!   SERIALIZABLE transaction holding a `FOR UPDATE` lock on the slot row;
//!   [`db::memory::MemoryStore`] gives equivalent per-slot serialization
//!   with async mutexes and staged writes. Two callers racing for the last
//!   seat are serialized either way: exactly one commits, the other sees
//!   `GUARD_FULL` or a serialization conflict to retry.
//! - [`notify::NotificationDispatcher`] — fire-and-forget delivery, invoked
//!   strictly after commit and never under a slot lock; failures are
//!   logged, never surfaced.
//! - [`roles::Directory`] — role lookups for the delegate-assignment
//!   predicate and escalation fan-out.
//! - [`audit::AuditLog`] — best-effort audit trail.
//!
//! The services on top: [`services::SlotRegistry`] (creation, overlap
//! validation, whole-slot cancellation), [`services::AssignmentManager`]
//! (the capacity-safe register/cancel core),
//! [`services::WaitingListManager`] (join/leave/promote) and
//! [`services::ScenarioExpander`] (template expansion).
//!
//! Errors carry stable codes ([`errors::ErrorCode`]) for the boundary
//! layer to map onto its transport; retry policy for serialization
//! conflicts belongs to the caller.

pub mod audit;
pub mod classify;
pub mod config;
pub mod db;
pub mod errors;
pub mod notify;
pub mod roles;
pub mod services;
pub mod test_utils;
pub mod types;

/// Migrator for the engine's schema, for callers owning the Postgres
/// lifecycle: `watchbill::migrator().run(&pool).await?`.
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}
