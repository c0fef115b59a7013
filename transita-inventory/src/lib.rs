pub mod fare;
pub mod ledger;
pub mod schedule;

pub use ledger::{apply_adjustment, InventoryAdjustment, InventoryError, SeatDelta};
pub use schedule::{Bus, Company, ReferenceDirectory, Route, Schedule};
