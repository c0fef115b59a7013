use crate::cache::EntityCache;
use crate::lifecycle::{self, CancelOutcome, LifecycleError, Transition};
use crate::models::{Booking, PassengerDetail};
use crate::repository::{
    BookingStore, BookingWrite, CommitRequest, ScheduleExpectation,
};
use chrono::Utc;
use std::sync::Arc;
use transita_core::payment::SettlementStatus;
use transita_core::{CoreError, CoreResult};
use transita_inventory::{fare, InventoryAdjustment, Schedule};
use uuid::Uuid;

/// How many times a lost version race is retried before surfacing.
const COMMIT_ATTEMPTS: u32 = 8;

#[derive(Debug, Clone)]
pub struct NewBookingRequest {
    pub customer_id: Uuid,
    pub schedule_id: Uuid,
    pub passengers: Vec<PassengerDetail>,
}

/// The only component allowed to request status transitions or inventory
/// mutations. Every operation: read fresh state, run the pure decision,
/// commit the booking write and inventory delta as one atomic unit, retry
/// on version conflict, and evict the schedule cache when inventory moved.
pub struct LifecycleEngine {
    store: Arc<dyn BookingStore>,
    schedules: Arc<EntityCache<Schedule>>,
    service_fee: i64,
}

fn lifecycle_to_core(err: LifecycleError) -> CoreError {
    CoreError::Precondition(err.to_string())
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<dyn BookingStore>,
        schedules: Arc<EntityCache<Schedule>>,
        service_fee: i64,
    ) -> Self {
        Self { store, schedules, service_fee }
    }

    /// Reserve seats: insert a Pending/Pending booking and hold its seats in
    /// the same atomic unit. Any already-taken seat aborts the whole unit.
    pub async fn create(&self, request: NewBookingRequest) -> CoreResult<Booking> {
        let mut attempt = 0u32;
        loop {
            let vs = self
                .store
                .schedule(request.schedule_id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("schedule {}", request.schedule_id)))?;
            if vs.schedule.has_departed(Utc::now()) {
                return Err(CoreError::Precondition("schedule has already departed".into()));
            }

            let total = fare::total_fare(
                vs.schedule.seat_price,
                request.passengers.len(),
                self.service_fee,
            );
            let booking = Booking::new(
                request.customer_id,
                request.schedule_id,
                vs.schedule.company_id,
                request.passengers.clone(),
                total,
            )
            .map_err(|e| CoreError::Precondition(e.to_string()))?;

            let adjustment =
                InventoryAdjustment::hold(vs.schedule.id, booking.seat_numbers.iter().cloned());
            let commit = CommitRequest {
                write: BookingWrite::Insert(booking.clone()),
                expected_booking_version: None,
                inventory: Some(ScheduleExpectation {
                    adjustment,
                    expected_version: vs.version,
                }),
            };

            match self.store.commit(commit).await {
                Ok(()) => {
                    self.schedules.invalidate(request.schedule_id).await;
                    tracing::info!(booking_id = %booking.id, reference = %booking.reference, "booking created");
                    return Ok(booking);
                }
                Err(CoreError::Conflict(reason)) if attempt + 1 < COMMIT_ATTEMPTS => {
                    attempt += 1;
                    tracing::debug!(schedule_id = %request.schedule_id, attempt, %reason, "create lost a version race, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn confirm(&self, booking_id: Uuid) -> CoreResult<Booking> {
        let (booking, ()) = self
            .apply(booking_id, |b, _s| lifecycle::confirm(b).map(|t| (t, ())))
            .await?;
        Ok(booking)
    }

    pub async fn reject(&self, booking_id: Uuid) -> CoreResult<Booking> {
        let (booking, ()) = self
            .apply(booking_id, |b, s| lifecycle::reject(b, s).map(|t| (t, ())))
            .await?;
        Ok(booking)
    }

    /// Customer cancel; see `lifecycle::cancel` for the paid/unpaid split.
    pub async fn cancel(&self, booking_id: Uuid) -> CoreResult<(Booking, CancelOutcome)> {
        self.apply(booking_id, |b, s| lifecycle::cancel(b, s, Utc::now())).await
    }

    pub async fn approve_cancellation(&self, booking_id: Uuid) -> CoreResult<Booking> {
        let (booking, ()) = self
            .apply(booking_id, |b, s| lifecycle::approve_cancellation(b, s).map(|t| (t, ())))
            .await?;
        Ok(booking)
    }

    pub async fn complete(&self, booking_id: Uuid) -> CoreResult<Booking> {
        let (booking, ()) = self
            .apply(booking_id, |b, s| lifecycle::complete(b, s, Utc::now()).map(|t| (t, ())))
            .await?;
        Ok(booking)
    }

    /// Fold a settlement outcome into the booking. Idempotent: a settled
    /// booking is returned unchanged, with no second write and no event.
    pub async fn settle_payment(
        &self,
        booking_id: Uuid,
        outcome: SettlementStatus,
    ) -> CoreResult<Booking> {
        let mut attempt = 0u32;
        loop {
            let vb = self
                .store
                .booking(booking_id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("booking {booking_id}")))?;
            let transition = match lifecycle::settle_payment(&vb.booking, outcome)
                .map_err(lifecycle_to_core)?
            {
                None => return Ok(vb.booking),
                Some(t) => t,
            };
            let commit = CommitRequest {
                write: BookingWrite::Update(transition.booking.clone()),
                expected_booking_version: Some(vb.version),
                inventory: None,
            };
            match self.store.commit(commit).await {
                Ok(()) => return Ok(transition.booking),
                Err(CoreError::Conflict(reason)) if attempt + 1 < COMMIT_ATTEMPTS => {
                    attempt += 1;
                    tracing::debug!(%booking_id, attempt, %reason, "settlement lost a version race, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Remove a cancelled booking record. Inventory untouched: the seats
    /// went back when the booking was cancelled.
    pub async fn delete_cancelled(&self, booking_id: Uuid) -> CoreResult<()> {
        let mut attempt = 0u32;
        loop {
            let vb = self
                .store
                .booking(booking_id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("booking {booking_id}")))?;
            lifecycle::validate_delete(&vb.booking).map_err(lifecycle_to_core)?;
            let commit = CommitRequest {
                write: BookingWrite::Delete(booking_id),
                expected_booking_version: Some(vb.version),
                inventory: None,
            };
            match self.store.commit(commit).await {
                Ok(()) => return Ok(()),
                Err(CoreError::Conflict(reason)) if attempt + 1 < COMMIT_ATTEMPTS => {
                    attempt += 1;
                    tracing::debug!(%booking_id, attempt, %reason, "delete lost a version race, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Shared read-decide-commit-retry loop for schedule-aware transitions.
    async fn apply<T, F>(&self, booking_id: Uuid, decide: F) -> CoreResult<(Booking, T)>
    where
        F: Fn(&Booking, &Schedule) -> Result<(Transition, T), LifecycleError>,
    {
        let mut attempt = 0u32;
        loop {
            let vb = self
                .store
                .booking(booking_id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("booking {booking_id}")))?;
            vb.booking
                .validate_integrity()
                .map_err(|e| CoreError::Precondition(e.to_string()))?;
            let vs = self
                .store
                .schedule(vb.booking.schedule_id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("schedule {}", vb.booking.schedule_id)))?;

            let (transition, out) =
                decide(&vb.booking, &vs.schedule).map_err(lifecycle_to_core)?;
            let touches_inventory = transition.inventory.is_some();
            let commit = CommitRequest {
                write: BookingWrite::Update(transition.booking.clone()),
                expected_booking_version: Some(vb.version),
                inventory: transition.inventory.map(|adjustment| ScheduleExpectation {
                    adjustment,
                    expected_version: vs.version,
                }),
            };

            match self.store.commit(commit).await {
                Ok(()) => {
                    if touches_inventory {
                        self.schedules.invalidate(vs.schedule.id).await;
                    }
                    return Ok((transition.booking, out));
                }
                Err(CoreError::Conflict(reason)) if attempt + 1 < COMMIT_ATTEMPTS => {
                    attempt += 1;
                    tracing::debug!(%booking_id, attempt, %reason, "transition lost a version race, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}
