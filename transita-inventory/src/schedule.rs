use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// One scheduled departure: the unit of seat inventory. Mutated only through
/// the ledger inside an atomic commit; read-shared by everyone else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub company_id: Uuid,
    pub bus_id: Uuid,
    pub route_id: Uuid,
    pub departure_at: DateTime<Utc>,
    pub arrival_at: DateTime<Utc>,
    /// Price per seat, minor currency units.
    pub seat_price: i64,
    pub capacity: u32,
    pub available_seats: u32,
    pub booked_seats: BTreeSet<String>,
}

impl Schedule {
    /// The seat-count invariant: available + booked == capacity.
    pub fn capacity_invariant_holds(&self) -> bool {
        self.available_seats as usize + self.booked_seats.len() == self.capacity as usize
    }

    pub fn has_departed(&self, now: DateTime<Utc>) -> bool {
        self.departure_at <= now
    }
}

/// Immutable reference data: the vehicle operating a schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bus {
    pub id: Uuid,
    pub company_id: Uuid,
    pub registration: String,
    pub model: String,
    pub total_seats: u32,
}

/// Immutable reference data: origin/destination pair a schedule runs on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: Uuid,
    pub origin: String,
    pub destination: String,
    pub distance_km: u32,
}

impl Route {
    /// Human-readable label used in notifications and the payment contract.
    pub fn label(&self) -> String {
        format!("{} → {}", self.origin, self.destination)
    }
}

/// Immutable reference data: the operator a schedule belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub contact_phone: String,
}

/// Read access to reference data. The booking core never mutates these.
#[async_trait]
pub trait ReferenceDirectory: Send + Sync {
    async fn bus(&self, id: Uuid) -> Result<Option<Bus>, Box<dyn std::error::Error + Send + Sync>>;

    async fn route(
        &self,
        id: Uuid,
    ) -> Result<Option<Route>, Box<dyn std::error::Error + Send + Sync>>;

    async fn company(
        &self,
        id: Uuid,
    ) -> Result<Option<Company>, Box<dyn std::error::Error + Send + Sync>>;
}
