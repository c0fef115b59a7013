use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Booking status in the lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingStatus::Pending => write!(f, "PENDING"),
            BookingStatus::Confirmed => write!(f, "CONFIRMED"),
            BookingStatus::Cancelled => write!(f, "CANCELLED"),
            BookingStatus::Completed => write!(f, "COMPLETED"),
        }
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BookingStatus::Pending),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "COMPLETED" => Ok(BookingStatus::Completed),
            other => Err(format!("unknown booking status {other:?}")),
        }
    }
}

/// Settlement state of the booking's charge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "PENDING"),
            PaymentStatus::Paid => write!(f, "PAID"),
            PaymentStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "PAID" => Ok(PaymentStatus::Paid),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(format!("unknown payment status {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Female,
    Male,
    Other,
}

/// One traveler, pinned to one seat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassengerDetail {
    pub name: String,
    pub age: u8,
    pub gender: Gender,
    pub seat_number: String,
}

/// The booking record. Mutated only by lifecycle-engine transitions; never
/// physically deleted except by explicit customer delete of a cancelled one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub schedule_id: Uuid,
    pub company_id: Uuid,
    /// Seat codes in selection order; unique within the booking.
    pub seat_numbers: Vec<String>,
    pub passengers: Vec<PassengerDetail>,
    /// Minor currency units; always positive.
    pub total_amount: i64,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub cancellation_requested: bool,
    /// Human-readable reference, unique across bookings.
    pub reference: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum BookingDataError {
    #[error("booking has no seats")]
    NoSeats,

    #[error("seat {0} appears more than once")]
    DuplicateSeat(String),

    #[error("passenger {0} has no usable name")]
    MissingPassengerName(usize),

    #[error("passenger count {passengers} does not match seat count {seats}")]
    SeatPassengerMismatch { passengers: usize, seats: usize },

    #[error("passenger seat {0} is not part of the booking's seat list")]
    UnknownPassengerSeat(String),

    #[error("total amount must be positive, got {0}")]
    NonPositiveAmount(i64),
}

impl Booking {
    /// Build a fresh Pending/Pending booking from validated passenger data.
    /// The seat list is derived from the passengers, order preserved.
    pub fn new(
        customer_id: Uuid,
        schedule_id: Uuid,
        company_id: Uuid,
        passengers: Vec<PassengerDetail>,
        total_amount: i64,
    ) -> Result<Self, BookingDataError> {
        let seat_numbers: Vec<String> =
            passengers.iter().map(|p| p.seat_number.clone()).collect();
        let now = Utc::now();
        let booking = Self {
            id: Uuid::new_v4(),
            customer_id,
            schedule_id,
            company_id,
            seat_numbers,
            passengers,
            total_amount,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            cancellation_requested: false,
            reference: generate_reference(),
            created_at: now,
            updated_at: now,
        };
        booking.validate_integrity()?;
        Ok(booking)
    }

    /// Re-check record invariants. Run before any transition so a corrupted
    /// record is refused instead of propagated.
    pub fn validate_integrity(&self) -> Result<(), BookingDataError> {
        if self.seat_numbers.is_empty() {
            return Err(BookingDataError::NoSeats);
        }
        let mut seen = HashSet::new();
        for seat in &self.seat_numbers {
            if !seen.insert(seat.as_str()) {
                return Err(BookingDataError::DuplicateSeat(seat.clone()));
            }
        }
        if self.passengers.len() != self.seat_numbers.len() {
            return Err(BookingDataError::SeatPassengerMismatch {
                passengers: self.passengers.len(),
                seats: self.seat_numbers.len(),
            });
        }
        for (idx, passenger) in self.passengers.iter().enumerate() {
            if passenger.name.trim().is_empty() {
                return Err(BookingDataError::MissingPassengerName(idx));
            }
            if !seen.contains(passenger.seat_number.as_str()) {
                return Err(BookingDataError::UnknownPassengerSeat(
                    passenger.seat_number.clone(),
                ));
            }
        }
        if self.total_amount <= 0 {
            return Err(BookingDataError::NonPositiveAmount(self.total_amount));
        }
        Ok(())
    }

    /// Bump updated_at, keeping it monotonic per record.
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = if now > self.updated_at { now } else { self.updated_at };
    }
}

/// Human-readable booking reference, e.g. "TR-9F3A21C4".
pub fn generate_reference() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("TR-{}", raw[..8].to_uppercase())
}
