//! Business services over the storage ports.
//!
//! Layering, leaves first: [`slot_registry::SlotRegistry`] owns slot
//! lifecycle and overlap rules; [`assignments::AssignmentManager`] owns the
//! capacity-safe register/cancel core; [`waiting_list::WaitingListManager`]
//! queues and promotes through the manager; [`scenarios::ScenarioExpander`]
//! bulk-creates through the registry.

pub mod assignments;
pub mod scenarios;
pub mod slot_registry;
pub mod waiting_list;

pub use assignments::{AssignmentManager, CancelOptions, CancellationOutcome, RegistrationOutcome};
pub use scenarios::ScenarioExpander;
pub use slot_registry::SlotRegistry;
pub use waiting_list::WaitingListManager;
