//! Storage layer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │   Services   │  (services::* — business rules)
//! └──────┬───────┘
//!        │  Store / SlotTx ports (store)
//!        ↓
//! ┌──────────────┐      ┌──────────────┐
//! │   PgStore    │  or  │ MemoryStore  │
//! │  (postgres)  │      │   (memory)   │
//! └──────┬───────┘      └──────────────┘
//!        ↓
//! ┌──────────────┐
//! │  PostgreSQL  │
//! └──────────────┘
//! ```
//!
//! All slot-mutating operations go through a [`store::SlotTx`]: a
//! transaction scoped to one slot that holds a write lock on it until
//! commit. Reads take no lock. The Postgres implementation maps this onto
//! SERIALIZABLE transactions with `SELECT ... FOR UPDATE`; the in-memory
//! implementation onto one async mutex per slot with staged writes.

pub mod errors;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;
