use crate::models::Booking;
use async_trait::async_trait;
use tokio::sync::broadcast;
use transita_core::{CoreError, CoreResult};
use transita_inventory::{InventoryAdjustment, InventoryError, Schedule};
use uuid::Uuid;

/// A booking read together with its optimistic-concurrency token.
#[derive(Debug, Clone)]
pub struct VersionedBooking {
    pub booking: Booking,
    pub version: u64,
}

/// A schedule read together with its optimistic-concurrency token.
#[derive(Debug, Clone)]
pub struct VersionedSchedule {
    pub schedule: Schedule,
    pub version: u64,
}

#[derive(Debug, Clone)]
pub enum BookingWrite {
    Insert(Booking),
    Update(Booking),
    Delete(Uuid),
}

/// The inventory half of an atomic unit: the adjustment to apply plus the
/// schedule version it was decided against.
#[derive(Debug, Clone)]
pub struct ScheduleExpectation {
    pub adjustment: InventoryAdjustment,
    pub expected_version: u64,
}

/// One atomic unit: a booking write and (optionally) the matching inventory
/// adjustment. The store commits both or neither. Version expectations make
/// the commit conditional; a mismatch yields `CoreError::Conflict` and the
/// engine re-reads and retries.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub write: BookingWrite,
    /// Required for Update/Delete; None for Insert.
    pub expected_booking_version: Option<u64>,
    pub inventory: Option<ScheduleExpectation>,
}

/// Record-changed feed payload: the before/after snapshots of one committed
/// write. `after: None` means the record was deleted.
#[derive(Debug, Clone)]
pub struct BookingChanged {
    pub before: Option<Booking>,
    pub after: Option<Booking>,
}

/// Storage contract for bookings and their schedules. Implementations must
/// guarantee per-unit atomicity for `commit` and honor the version checks.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn booking(&self, id: Uuid) -> CoreResult<Option<VersionedBooking>>;

    async fn bookings_for_customer(&self, customer_id: Uuid) -> CoreResult<Vec<Booking>>;

    async fn schedule(&self, id: Uuid) -> CoreResult<Option<VersionedSchedule>>;

    async fn commit(&self, request: CommitRequest) -> CoreResult<()>;

    /// Subscribe to the record-changed feed. Every committed write publishes
    /// exactly one event after the unit is durable.
    fn watch(&self) -> broadcast::Receiver<BookingChanged>;
}

/// Fold a ledger error into the core taxonomy. Seat contention is a
/// precondition the caller can correct; an invariant break is fatal.
pub fn inventory_error_to_core(err: InventoryError) -> CoreError {
    match err {
        InventoryError::SeatAlreadyBooked(_) | InventoryError::InsufficientSeats { .. } => {
            CoreError::Precondition(err.to_string())
        }
        InventoryError::WrongSchedule { .. } | InventoryError::InvariantViolated { .. } => {
            CoreError::InventoryConsistency(err.to_string())
        }
    }
}
