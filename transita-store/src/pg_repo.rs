use crate::database::DbClient;
use crate::events::BookingFeed;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::BTreeSet;
use std::str::FromStr;
use tokio::sync::broadcast;
use transita_booking::models::{Booking, BookingStatus, PassengerDetail, PaymentStatus};
use transita_booking::repository::{
    inventory_error_to_core, BookingChanged, BookingStore, BookingWrite, CommitRequest,
    VersionedBooking, VersionedSchedule,
};
use transita_core::{CoreError, CoreResult};
use transita_inventory::{apply_adjustment, Bus, Company, ReferenceDirectory, Route, Schedule};
use uuid::Uuid;

/// Postgres-backed store. Each atomic unit is one transaction; every UPDATE
/// and DELETE carries a `version = $n` guard so concurrent units that read
/// the same state resolve to exactly one winner, and the losers surface as
/// `Conflict` for the engine's retry loop.
pub struct PgStore {
    pool: PgPool,
    feed: BookingFeed,
}

impl PgStore {
    pub fn new(db: &DbClient, feed: BookingFeed) -> Self {
        Self { pool: db.pool.clone(), feed }
    }
}

fn db_err(err: sqlx::Error) -> CoreError {
    match &err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => CoreError::Transient(err.to_string()),
        _ => CoreError::Internal(err.to_string()),
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    customer_id: Uuid,
    schedule_id: Uuid,
    company_id: Uuid,
    seat_numbers: Vec<String>,
    passengers: serde_json::Value,
    total_amount: i64,
    status: String,
    payment_status: String,
    cancellation_requested: bool,
    reference: String,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BookingRow {
    fn into_versioned(self) -> CoreResult<VersionedBooking> {
        let passengers: Vec<PassengerDetail> = serde_json::from_value(self.passengers)
            .map_err(|e| CoreError::Internal(format!("corrupt passenger data: {e}")))?;
        let booking = Booking {
            id: self.id,
            customer_id: self.customer_id,
            schedule_id: self.schedule_id,
            company_id: self.company_id,
            seat_numbers: self.seat_numbers,
            passengers,
            total_amount: self.total_amount,
            status: BookingStatus::from_str(&self.status).map_err(CoreError::Internal)?,
            payment_status: PaymentStatus::from_str(&self.payment_status)
                .map_err(CoreError::Internal)?,
            cancellation_requested: self.cancellation_requested,
            reference: self.reference,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };
        Ok(VersionedBooking { booking, version: self.version as u64 })
    }
}

#[derive(sqlx::FromRow)]
struct ScheduleRow {
    id: Uuid,
    company_id: Uuid,
    bus_id: Uuid,
    route_id: Uuid,
    departure_at: DateTime<Utc>,
    arrival_at: DateTime<Utc>,
    seat_price: i64,
    capacity: i32,
    available_seats: i32,
    booked_seats: Vec<String>,
    version: i64,
}

impl ScheduleRow {
    fn into_versioned(self) -> VersionedSchedule {
        VersionedSchedule {
            schedule: Schedule {
                id: self.id,
                company_id: self.company_id,
                bus_id: self.bus_id,
                route_id: self.route_id,
                departure_at: self.departure_at,
                arrival_at: self.arrival_at,
                seat_price: self.seat_price,
                capacity: self.capacity as u32,
                available_seats: self.available_seats as u32,
                booked_seats: self.booked_seats.into_iter().collect::<BTreeSet<String>>(),
            },
            version: self.version as u64,
        }
    }
}

const BOOKING_COLUMNS: &str = "id, customer_id, schedule_id, company_id, seat_numbers, \
     passengers, total_amount, status, payment_status, cancellation_requested, reference, \
     version, created_at, updated_at";

const SCHEDULE_COLUMNS: &str = "id, company_id, bus_id, route_id, departure_at, arrival_at, \
     seat_price, capacity, available_seats, booked_seats, version";

async fn fetch_booking_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> CoreResult<Option<VersionedBooking>> {
    let row = sqlx::query_as::<_, BookingRow>(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_err)?;
    row.map(BookingRow::into_versioned).transpose()
}

async fn insert_booking_tx(
    tx: &mut Transaction<'_, Postgres>,
    booking: &Booking,
) -> CoreResult<()> {
    let passengers = serde_json::to_value(&booking.passengers)
        .map_err(|e| CoreError::Internal(e.to_string()))?;
    sqlx::query(
        "INSERT INTO bookings (id, customer_id, schedule_id, company_id, seat_numbers, \
         passengers, total_amount, status, payment_status, cancellation_requested, reference, \
         version, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 1, $12, $13)",
    )
    .bind(booking.id)
    .bind(booking.customer_id)
    .bind(booking.schedule_id)
    .bind(booking.company_id)
    .bind(&booking.seat_numbers)
    .bind(passengers)
    .bind(booking.total_amount)
    .bind(booking.status.to_string())
    .bind(booking.payment_status.to_string())
    .bind(booking.cancellation_requested)
    .bind(&booking.reference)
    .bind(booking.created_at)
    .bind(booking.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            CoreError::Conflict(format!("booking {} already exists", booking.id))
        }
        _ => db_err(e),
    })?;
    Ok(())
}

#[async_trait]
impl BookingStore for PgStore {
    async fn booking(&self, id: Uuid) -> CoreResult<Option<VersionedBooking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(BookingRow::into_versioned).transpose()
    }

    async fn bookings_for_customer(&self, customer_id: Uuid) -> CoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE customer_id = $1 \
             ORDER BY created_at DESC"
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter()
            .map(|row| row.into_versioned().map(|v| v.booking))
            .collect()
    }

    async fn schedule(&self, id: Uuid) -> CoreResult<Option<VersionedSchedule>> {
        let row = sqlx::query_as::<_, ScheduleRow>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(ScheduleRow::into_versioned))
    }

    async fn commit(&self, request: CommitRequest) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Inventory half first: recompute from the row as it exists inside
        // this transaction, then write it back guarded by the version the
        // decision was made against.
        if let Some(expectation) = &request.inventory {
            let schedule_id = expectation.adjustment.schedule_id;
            let row = sqlx::query_as::<_, ScheduleRow>(&format!(
                "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = $1 FOR UPDATE"
            ))
            .bind(schedule_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
            .ok_or_else(|| CoreError::NotFound(format!("schedule {schedule_id}")))?;
            let current = row.into_versioned();
            if current.version != expectation.expected_version {
                return Err(CoreError::Conflict(format!(
                    "schedule {} is at version {}, expected {}",
                    schedule_id, current.version, expectation.expected_version
                )));
            }

            let next = apply_adjustment(&current.schedule, &expectation.adjustment)
                .map_err(|e| {
                    let core = inventory_error_to_core(e);
                    if matches!(core, CoreError::InventoryConsistency(_)) {
                        tracing::error!(%schedule_id, error = %core, "inventory adjustment aborted");
                    }
                    core
                })?;
            let booked: Vec<String> = next.booked_seats.iter().cloned().collect();
            let updated = sqlx::query(
                "UPDATE schedules SET available_seats = $1, booked_seats = $2, \
                 version = version + 1 WHERE id = $3 AND version = $4",
            )
            .bind(next.available_seats as i32)
            .bind(&booked)
            .bind(schedule_id)
            .bind(expectation.expected_version as i64)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
            if updated.rows_affected() != 1 {
                return Err(CoreError::Conflict(format!(
                    "schedule {schedule_id} changed under the commit"
                )));
            }
        }

        let (before, after) = match &request.write {
            BookingWrite::Insert(booking) => {
                insert_booking_tx(&mut tx, booking).await?;
                (None, Some(booking.clone()))
            }
            BookingWrite::Update(booking) => {
                let expected = request.expected_booking_version.ok_or_else(|| {
                    CoreError::Internal("update committed without a version expectation".into())
                })?;
                let current = fetch_booking_tx(&mut tx, booking.id)
                    .await?
                    .ok_or_else(|| CoreError::NotFound(format!("booking {}", booking.id)))?;
                let passengers = serde_json::to_value(&booking.passengers)
                    .map_err(|e| CoreError::Internal(e.to_string()))?;
                let updated = sqlx::query(
                    "UPDATE bookings SET status = $1, payment_status = $2, \
                     cancellation_requested = $3, passengers = $4, seat_numbers = $5, \
                     total_amount = $6, updated_at = $7, version = version + 1 \
                     WHERE id = $8 AND version = $9",
                )
                .bind(booking.status.to_string())
                .bind(booking.payment_status.to_string())
                .bind(booking.cancellation_requested)
                .bind(passengers)
                .bind(&booking.seat_numbers)
                .bind(booking.total_amount)
                .bind(booking.updated_at)
                .bind(booking.id)
                .bind(expected as i64)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
                if updated.rows_affected() != 1 {
                    return Err(CoreError::Conflict(format!(
                        "booking {} is past version {}",
                        booking.id, expected
                    )));
                }
                (Some(current.booking), Some(booking.clone()))
            }
            BookingWrite::Delete(id) => {
                let expected = request.expected_booking_version.ok_or_else(|| {
                    CoreError::Internal("delete committed without a version expectation".into())
                })?;
                let current = fetch_booking_tx(&mut tx, *id)
                    .await?
                    .ok_or_else(|| CoreError::NotFound(format!("booking {id}")))?;
                let deleted =
                    sqlx::query("DELETE FROM bookings WHERE id = $1 AND version = $2")
                        .bind(id)
                        .bind(expected as i64)
                        .execute(&mut *tx)
                        .await
                        .map_err(db_err)?;
                if deleted.rows_affected() != 1 {
                    return Err(CoreError::Conflict(format!(
                        "booking {id} is past version {expected}"
                    )));
                }
                (Some(current.booking), None)
            }
        };

        tx.commit().await.map_err(db_err)?;
        self.feed.publish(BookingChanged { before, after });
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<BookingChanged> {
        self.feed.subscribe()
    }
}

#[derive(sqlx::FromRow)]
struct BusRow {
    id: Uuid,
    company_id: Uuid,
    registration: String,
    model: String,
    total_seats: i32,
}

#[derive(sqlx::FromRow)]
struct RouteRow {
    id: Uuid,
    origin: String,
    destination: String,
    distance_km: i32,
}

#[derive(sqlx::FromRow)]
struct CompanyRow {
    id: Uuid,
    name: String,
    contact_phone: String,
}

#[async_trait]
impl ReferenceDirectory for PgStore {
    async fn bus(&self, id: Uuid) -> Result<Option<Bus>, Box<dyn std::error::Error + Send + Sync>> {
        let row = sqlx::query_as::<_, BusRow>(
            "SELECT id, company_id, registration, model, total_seats FROM buses WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| Bus {
            id: r.id,
            company_id: r.company_id,
            registration: r.registration,
            model: r.model,
            total_seats: r.total_seats as u32,
        }))
    }

    async fn route(
        &self,
        id: Uuid,
    ) -> Result<Option<Route>, Box<dyn std::error::Error + Send + Sync>> {
        let row = sqlx::query_as::<_, RouteRow>(
            "SELECT id, origin, destination, distance_km FROM routes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| Route {
            id: r.id,
            origin: r.origin,
            destination: r.destination,
            distance_km: r.distance_km as u32,
        }))
    }

    async fn company(
        &self,
        id: Uuid,
    ) -> Result<Option<Company>, Box<dyn std::error::Error + Send + Sync>> {
        let row = sqlx::query_as::<_, CompanyRow>(
            "SELECT id, name, contact_phone FROM companies WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| Company { id: r.id, name: r.name, contact_phone: r.contact_phone }))
    }
}
