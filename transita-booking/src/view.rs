use crate::cache::EntityCache;
use crate::models::Booking;
use crate::repository::BookingStore;
use crate::retry;
use futures_util::future::join_all;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use transita_core::{CoreError, CoreResult};
use transita_inventory::{Bus, Company, ReferenceDirectory, Route, Schedule};
use uuid::Uuid;

const FETCH_ATTEMPTS: u32 = 3;
const FETCH_BASE_DELAY: Duration = Duration::from_millis(100);

/// A booking joined with its full trip context. Produced on demand, never
/// persisted; staleness is bounded by explicit cache invalidation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EnhancedBooking {
    pub booking: Booking,
    pub schedule: Schedule,
    pub bus: Bus,
    pub route: Route,
    pub company: Company,
}

/// The session-lifetime caches behind batch presentation. Init on subscribe,
/// `teardown` on unsubscribe.
pub struct SessionCaches {
    pub schedules: Arc<EntityCache<Schedule>>,
    pub buses: Arc<EntityCache<Bus>>,
    pub routes: Arc<EntityCache<Route>>,
    pub companies: Arc<EntityCache<Company>>,
}

impl SessionCaches {
    pub fn new() -> Self {
        Self {
            schedules: Arc::new(EntityCache::new()),
            buses: Arc::new(EntityCache::new()),
            routes: Arc::new(EntityCache::new()),
            companies: Arc::new(EntityCache::new()),
        }
    }

    pub async fn teardown(&self) {
        self.schedules.clear().await;
        self.buses.clear().await;
        self.routes.clear().await;
        self.companies.clear().await;
    }
}

impl Default for SessionCaches {
    fn default() -> Self {
        Self::new()
    }
}

/// Batch join of bookings with schedule/bus/route/company context. I/O is
/// O(distinct referenced entities), not O(bookings): distinct ids are fetched
/// once each, in parallel, skipping cache residents; the join itself runs
/// purely over the in-memory maps.
pub struct BookingPresenter {
    store: Arc<dyn BookingStore>,
    directory: Arc<dyn ReferenceDirectory>,
    caches: Arc<SessionCaches>,
}

impl BookingPresenter {
    pub fn new(
        store: Arc<dyn BookingStore>,
        directory: Arc<dyn ReferenceDirectory>,
        caches: Arc<SessionCaches>,
    ) -> Self {
        Self { store, directory, caches }
    }

    pub async fn enhanced_bookings(&self, customer_id: Uuid) -> CoreResult<Vec<EnhancedBooking>> {
        let bookings = self.store.bookings_for_customer(customer_id).await?;
        if bookings.is_empty() {
            return Ok(Vec::new());
        }

        // Pass 1: distinct schedules and companies across the whole batch.
        let schedule_ids: HashSet<Uuid> = bookings.iter().map(|b| b.schedule_id).collect();
        let company_ids: HashSet<Uuid> = bookings.iter().map(|b| b.company_id).collect();

        let store = self.store.clone();
        let schedules = resolve(schedule_ids, &self.caches.schedules, "schedule", move |id| {
            let store = store.clone();
            async move { store.schedule(id).await.map(|found| found.map(|vs| vs.schedule)) }
        })
        .await;

        let directory = self.directory.clone();
        let companies = resolve(company_ids, &self.caches.companies, "company", move |id| {
            let directory = directory.clone();
            async move {
                directory
                    .company(id)
                    .await
                    .map_err(|e| CoreError::Transient(e.to_string()))
            }
        })
        .await;

        // Pass 2: buses and routes derived from the schedules we resolved.
        let bus_ids: HashSet<Uuid> = schedules.values().map(|s| s.bus_id).collect();
        let route_ids: HashSet<Uuid> = schedules.values().map(|s| s.route_id).collect();

        let directory = self.directory.clone();
        let buses = resolve(bus_ids, &self.caches.buses, "bus", move |id| {
            let directory = directory.clone();
            async move {
                directory.bus(id).await.map_err(|e| CoreError::Transient(e.to_string()))
            }
        })
        .await;

        let directory = self.directory.clone();
        let routes = resolve(route_ids, &self.caches.routes, "route", move |id| {
            let directory = directory.clone();
            async move {
                directory.route(id).await.map_err(|e| CoreError::Transient(e.to_string()))
            }
        })
        .await;

        // Join purely from the in-memory maps. A booking whose context could
        // not be resolved is excluded, with a trace of the omission.
        let mut enhanced = Vec::with_capacity(bookings.len());
        for booking in bookings {
            let Some(schedule) = schedules.get(&booking.schedule_id) else {
                tracing::warn!(booking_id = %booking.id, schedule_id = %booking.schedule_id, "excluding booking: schedule unresolved");
                continue;
            };
            let (Some(bus), Some(route), Some(company)) = (
                buses.get(&schedule.bus_id),
                routes.get(&schedule.route_id),
                companies.get(&booking.company_id),
            ) else {
                tracing::warn!(booking_id = %booking.id, "excluding booking: reference data unresolved");
                continue;
            };
            enhanced.push(EnhancedBooking {
                booking,
                schedule: (**schedule).clone(),
                bus: (**bus).clone(),
                route: (**route).clone(),
                company: (**company).clone(),
            });
        }
        Ok(enhanced)
    }
}

/// Resolve a set of distinct ids against a cache, fetching only the misses —
/// each once, all in parallel, transient failures retried with backoff.
/// Unresolvable ids are logged and dropped; the batch carries on without them.
async fn resolve<T, F, Fut>(
    ids: HashSet<Uuid>,
    cache: &EntityCache<T>,
    label: &'static str,
    fetch: F,
) -> HashMap<Uuid, Arc<T>>
where
    T: Send + Sync,
    F: Fn(Uuid) -> Fut,
    Fut: Future<Output = CoreResult<Option<T>>>,
{
    let mut resolved = HashMap::with_capacity(ids.len());
    let mut missing = Vec::new();
    for id in ids {
        match cache.get(id).await {
            Some(hit) => {
                resolved.insert(id, hit);
            }
            None => missing.push(id),
        }
    }

    let fetched = join_all(missing.into_iter().map(|id| {
        let fetch = &fetch;
        async move {
            let result =
                retry::with_backoff(label, FETCH_ATTEMPTS, FETCH_BASE_DELAY, || fetch(id)).await;
            (id, result)
        }
    }))
    .await;

    for (id, result) in fetched {
        match result {
            Ok(Some(value)) => {
                resolved.insert(id, cache.insert(id, value).await);
            }
            Ok(None) => {
                tracing::warn!(%id, label, "referenced entity does not exist");
            }
            Err(e) => {
                tracing::warn!(%id, label, error = %e, "lookup failed after retries");
            }
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Gender, PassengerDetail};
    use crate::repository::{BookingChanged, CommitRequest, VersionedBooking, VersionedSchedule};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::broadcast;

    struct StubStore {
        bookings: Vec<Booking>,
        schedules: HashMap<Uuid, Schedule>,
        schedule_fetches: AtomicU32,
        feed: broadcast::Sender<BookingChanged>,
    }

    #[async_trait]
    impl BookingStore for StubStore {
        async fn booking(&self, _id: Uuid) -> CoreResult<Option<VersionedBooking>> {
            Ok(None)
        }

        async fn bookings_for_customer(&self, customer_id: Uuid) -> CoreResult<Vec<Booking>> {
            Ok(self
                .bookings
                .iter()
                .filter(|b| b.customer_id == customer_id)
                .cloned()
                .collect())
        }

        async fn schedule(&self, id: Uuid) -> CoreResult<Option<VersionedSchedule>> {
            self.schedule_fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .schedules
                .get(&id)
                .cloned()
                .map(|schedule| VersionedSchedule { schedule, version: 1 }))
        }

        async fn commit(&self, _request: CommitRequest) -> CoreResult<()> {
            Err(CoreError::Internal("stub store is read-only".into()))
        }

        fn watch(&self) -> broadcast::Receiver<BookingChanged> {
            self.feed.subscribe()
        }
    }

    struct StubDirectory {
        buses: HashMap<Uuid, Bus>,
        routes: HashMap<Uuid, Route>,
        companies: HashMap<Uuid, Company>,
        company_fetches: AtomicU32,
        fail_companies: bool,
    }

    #[async_trait]
    impl ReferenceDirectory for StubDirectory {
        async fn bus(
            &self,
            id: Uuid,
        ) -> Result<Option<Bus>, Box<dyn std::error::Error + Send + Sync>> {
            Ok(self.buses.get(&id).cloned())
        }

        async fn route(
            &self,
            id: Uuid,
        ) -> Result<Option<Route>, Box<dyn std::error::Error + Send + Sync>> {
            Ok(self.routes.get(&id).cloned())
        }

        async fn company(
            &self,
            id: Uuid,
        ) -> Result<Option<Company>, Box<dyn std::error::Error + Send + Sync>> {
            self.company_fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_companies {
                return Err("directory offline".into());
            }
            Ok(self.companies.get(&id).cloned())
        }
    }

    fn fixture(fail_companies: bool) -> (Arc<StubStore>, Arc<StubDirectory>, Uuid) {
        let company = Company {
            id: Uuid::new_v4(),
            name: "Himal Lines".into(),
            contact_phone: "015550123".into(),
        };
        let bus = Bus {
            id: Uuid::new_v4(),
            company_id: company.id,
            registration: "BA 2 KHA 1234".into(),
            model: "Deluxe AC".into(),
            total_seats: 40,
        };
        let route = Route {
            id: Uuid::new_v4(),
            origin: "Kathmandu".into(),
            destination: "Pokhara".into(),
            distance_km: 204,
        };
        let schedule = Schedule {
            id: Uuid::new_v4(),
            company_id: company.id,
            bus_id: bus.id,
            route_id: route.id,
            departure_at: Utc::now() + ChronoDuration::hours(8),
            arrival_at: Utc::now() + ChronoDuration::hours(15),
            seat_price: 120_000,
            capacity: 40,
            booked_seats: ["A1", "A2", "B1"].iter().map(|s| s.to_string()).collect(),
            available_seats: 37,
        };

        let customer_id = Uuid::new_v4();
        let passenger = |seat: &str| PassengerDetail {
            name: "Asha".into(),
            age: 30,
            gender: Gender::Female,
            seat_number: seat.into(),
        };
        let b1 = Booking::new(
            customer_id,
            schedule.id,
            company.id,
            vec![passenger("A1"), passenger("A2")],
            240_000,
        )
        .unwrap();
        let b2 = Booking::new(customer_id, schedule.id, company.id, vec![passenger("B1")], 120_000)
            .unwrap();

        let (feed, _) = broadcast::channel(8);
        let store = Arc::new(StubStore {
            bookings: vec![b1, b2],
            schedules: HashMap::from([(schedule.id, schedule)]),
            schedule_fetches: AtomicU32::new(0),
            feed,
        });
        let directory = Arc::new(StubDirectory {
            buses: HashMap::from([(bus.id, bus)]),
            routes: HashMap::from([(route.id, route)]),
            companies: HashMap::from([(company.id, company)]),
            company_fetches: AtomicU32::new(0),
            fail_companies,
        });
        (store, directory, customer_id)
    }

    #[tokio::test]
    async fn joins_fetch_each_distinct_entity_once() {
        let (store, directory, customer_id) = fixture(false);
        let caches = Arc::new(SessionCaches::new());
        let presenter = BookingPresenter::new(store.clone(), directory.clone(), caches.clone());

        let enhanced = presenter.enhanced_bookings(customer_id).await.unwrap();
        assert_eq!(enhanced.len(), 2);
        // Two bookings, one shared schedule and company: one fetch each.
        assert_eq!(store.schedule_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(directory.company_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(enhanced[0].route.label(), "Kathmandu → Pokhara");
    }

    #[tokio::test]
    async fn second_batch_is_served_from_cache() {
        let (store, directory, customer_id) = fixture(false);
        let caches = Arc::new(SessionCaches::new());
        let presenter = BookingPresenter::new(store.clone(), directory.clone(), caches.clone());

        presenter.enhanced_bookings(customer_id).await.unwrap();
        presenter.enhanced_bookings(customer_id).await.unwrap();
        assert_eq!(store.schedule_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(directory.company_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidated_schedule_is_refetched() {
        let (store, directory, customer_id) = fixture(false);
        let caches = Arc::new(SessionCaches::new());
        let presenter = BookingPresenter::new(store.clone(), directory.clone(), caches.clone());

        presenter.enhanced_bookings(customer_id).await.unwrap();
        let schedule_id = *store.schedules.keys().next().unwrap();
        caches.schedules.invalidate(schedule_id).await;
        presenter.enhanced_bookings(customer_id).await.unwrap();
        assert_eq!(store.schedule_fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unresolvable_context_degrades_to_exclusion() {
        let (store, directory, customer_id) = fixture(true);
        let caches = Arc::new(SessionCaches::new());
        let presenter = BookingPresenter::new(store, directory, caches);

        // Company lookups are down: the batch still succeeds, just empty.
        let enhanced = presenter.enhanced_bookings(customer_id).await.unwrap();
        assert!(enhanced.is_empty());
    }

    #[tokio::test]
    async fn teardown_clears_every_cache() {
        let (store, directory, customer_id) = fixture(false);
        let caches = Arc::new(SessionCaches::new());
        let presenter = BookingPresenter::new(store.clone(), directory, caches.clone());

        presenter.enhanced_bookings(customer_id).await.unwrap();
        assert_eq!(caches.schedules.len().await, 1);
        caches.teardown().await;
        assert_eq!(caches.schedules.len().await, 0);
        assert_eq!(caches.companies.len().await, 0);
    }
}
