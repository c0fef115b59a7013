use crate::events::BookingFeed;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use transita_booking::models::Booking;
use transita_booking::repository::{
    inventory_error_to_core, BookingChanged, BookingStore, BookingWrite, CommitRequest,
    VersionedBooking, VersionedSchedule,
};
use transita_core::{CoreError, CoreResult};
use transita_inventory::{apply_adjustment, Bus, Company, ReferenceDirectory, Route, Schedule};
use uuid::Uuid;

struct Versioned<T> {
    value: T,
    version: u64,
}

#[derive(Default)]
struct Inner {
    bookings: HashMap<Uuid, Versioned<Booking>>,
    schedules: HashMap<Uuid, Versioned<Schedule>>,
    buses: HashMap<Uuid, Bus>,
    routes: HashMap<Uuid, Route>,
    companies: HashMap<Uuid, Company>,
}

/// In-memory store. One write lock serializes each atomic unit, and the
/// version checks still run so the optimistic protocol behaves exactly as it
/// does against Postgres. Backs development and the test suites.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    feed: BookingFeed,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { inner: RwLock::new(Inner::default()), feed: BookingFeed::default() }
    }

    pub async fn seed_schedule(&self, schedule: Schedule) {
        self.inner
            .write()
            .await
            .schedules
            .insert(schedule.id, Versioned { value: schedule, version: 1 });
    }

    pub async fn seed_bus(&self, bus: Bus) {
        self.inner.write().await.buses.insert(bus.id, bus);
    }

    pub async fn seed_route(&self, route: Route) {
        self.inner.write().await.routes.insert(route.id, route);
    }

    pub async fn seed_company(&self, company: Company) {
        self.inner.write().await.companies.insert(company.id, company);
    }

    /// Test/setup helper: place a booking without going through the engine
    /// and without publishing a feed event.
    pub async fn seed_booking(&self, booking: Booking) {
        self.inner
            .write()
            .await
            .bookings
            .insert(booking.id, Versioned { value: booking, version: 1 });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn booking(&self, id: Uuid) -> CoreResult<Option<VersionedBooking>> {
        Ok(self.inner.read().await.bookings.get(&id).map(|v| VersionedBooking {
            booking: v.value.clone(),
            version: v.version,
        }))
    }

    async fn bookings_for_customer(&self, customer_id: Uuid) -> CoreResult<Vec<Booking>> {
        let inner = self.inner.read().await;
        let mut bookings: Vec<Booking> = inner
            .bookings
            .values()
            .filter(|v| v.value.customer_id == customer_id)
            .map(|v| v.value.clone())
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn schedule(&self, id: Uuid) -> CoreResult<Option<VersionedSchedule>> {
        Ok(self.inner.read().await.schedules.get(&id).map(|v| VersionedSchedule {
            schedule: v.value.clone(),
            version: v.version,
        }))
    }

    async fn commit(&self, request: CommitRequest) -> CoreResult<()> {
        let mut inner = self.inner.write().await;

        // Phase 1: validate the booking half without writing anything.
        let (before, after) = match &request.write {
            BookingWrite::Insert(b) => {
                if inner.bookings.contains_key(&b.id) {
                    return Err(CoreError::Conflict(format!("booking {} already exists", b.id)));
                }
                (None, Some(b.clone()))
            }
            BookingWrite::Update(b) => {
                let current = inner
                    .bookings
                    .get(&b.id)
                    .ok_or_else(|| CoreError::NotFound(format!("booking {}", b.id)))?;
                let expected = request.expected_booking_version.ok_or_else(|| {
                    CoreError::Internal("update committed without a version expectation".into())
                })?;
                if current.version != expected {
                    return Err(CoreError::Conflict(format!(
                        "booking {} is at version {}, expected {}",
                        b.id, current.version, expected
                    )));
                }
                (Some(current.value.clone()), Some(b.clone()))
            }
            BookingWrite::Delete(id) => {
                let current = inner
                    .bookings
                    .get(id)
                    .ok_or_else(|| CoreError::NotFound(format!("booking {id}")))?;
                let expected = request.expected_booking_version.ok_or_else(|| {
                    CoreError::Internal("delete committed without a version expectation".into())
                })?;
                if current.version != expected {
                    return Err(CoreError::Conflict(format!(
                        "booking {} is at version {}, expected {}",
                        id, current.version, expected
                    )));
                }
                (Some(current.value.clone()), None)
            }
        };

        // Phase 2: the inventory half. Any failure aborts the whole unit —
        // the booking maps have not been touched yet.
        if let Some(expectation) = &request.inventory {
            let schedule_id = expectation.adjustment.schedule_id;
            let entry = inner
                .schedules
                .get_mut(&schedule_id)
                .ok_or_else(|| CoreError::NotFound(format!("schedule {schedule_id}")))?;
            if entry.version != expectation.expected_version {
                return Err(CoreError::Conflict(format!(
                    "schedule {} is at version {}, expected {}",
                    schedule_id, entry.version, expectation.expected_version
                )));
            }
            let next =
                apply_adjustment(&entry.value, &expectation.adjustment).map_err(|e| {
                    let core = inventory_error_to_core(e);
                    if matches!(core, CoreError::InventoryConsistency(_)) {
                        tracing::error!(%schedule_id, error = %core, "inventory adjustment aborted");
                    }
                    core
                })?;
            entry.value = next;
            entry.version += 1;
        }

        // Phase 3: apply the booking write. All checks have passed; the unit
        // commits as a whole under the exclusive lock.
        match request.write {
            BookingWrite::Insert(b) => {
                inner.bookings.insert(b.id, Versioned { value: b, version: 1 });
            }
            BookingWrite::Update(b) => {
                if let Some(entry) = inner.bookings.get_mut(&b.id) {
                    entry.value = b;
                    entry.version += 1;
                }
            }
            BookingWrite::Delete(id) => {
                inner.bookings.remove(&id);
            }
        }
        drop(inner);

        self.feed.publish(BookingChanged { before, after });
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<BookingChanged> {
        self.feed.subscribe()
    }
}

#[async_trait]
impl ReferenceDirectory for MemoryStore {
    async fn bus(&self, id: Uuid) -> Result<Option<Bus>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.inner.read().await.buses.get(&id).cloned())
    }

    async fn route(
        &self,
        id: Uuid,
    ) -> Result<Option<Route>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.inner.read().await.routes.get(&id).cloned())
    }

    async fn company(
        &self,
        id: Uuid,
    ) -> Result<Option<Company>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.inner.read().await.companies.get(&id).cloned())
    }
}
