//! Database record models matching table schemas.
//!
//! Struct definitions corresponding to database rows, shared verbatim by
//! the Postgres store and the in-memory store. Enums are stored as TEXT via
//! `sqlx::Type`; request structs (`SlotCreate`, `AssignmentCreate`, ...)
//! are separate from row structs so storage and call-site representations
//! can evolve independently.

pub mod assignments;
pub mod scenarios;
pub mod slots;
pub mod waiting_list;
