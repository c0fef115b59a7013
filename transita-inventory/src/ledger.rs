use crate::schedule::Schedule;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Signed change to one schedule's seat inventory. Always applied inside the
/// same atomic unit as the booking write it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryAdjustment {
    pub schedule_id: Uuid,
    pub delta: SeatDelta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SeatDelta {
    /// Take seats out of availability at reservation time. Aborts if any
    /// requested seat is already booked or availability would go negative.
    Hold { seats: BTreeSet<String> },

    /// Return seats at cancellation time. `seats` is removed from the booked
    /// set with set-difference so duplicate or partial entries cannot corrupt
    /// it; `seat_delta` is the signed change to `available_seats` asserted by
    /// the caller and cross-checked against the capacity invariant.
    Release { seat_delta: i32, seats: BTreeSet<String> },
}

impl InventoryAdjustment {
    pub fn hold(schedule_id: Uuid, seats: impl IntoIterator<Item = String>) -> Self {
        Self {
            schedule_id,
            delta: SeatDelta::Hold { seats: seats.into_iter().collect() },
        }
    }

    pub fn release(schedule_id: Uuid, seats: impl IntoIterator<Item = String>) -> Self {
        let seats: BTreeSet<String> = seats.into_iter().collect();
        Self {
            schedule_id,
            delta: SeatDelta::Release { seat_delta: seats.len() as i32, seats },
        }
    }

    /// Seats this adjustment returns to the pool, if any.
    pub fn released_seats(&self) -> Option<&BTreeSet<String>> {
        match &self.delta {
            SeatDelta::Release { seats, .. } => Some(seats),
            SeatDelta::Hold { .. } => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("adjustment targets schedule {expected}, got {actual}")]
    WrongSchedule { expected: Uuid, actual: Uuid },

    #[error("seat {0} is already booked")]
    SeatAlreadyBooked(String),

    #[error("insufficient seats: requested {requested}, available {available}")]
    InsufficientSeats { requested: usize, available: u32 },

    #[error("capacity invariant violated on schedule {schedule_id}: {detail}")]
    InvariantViolated { schedule_id: Uuid, detail: String },
}

/// Recompute a schedule under one adjustment. Pure: the caller commits the
/// returned value atomically with the booking write, or aborts the whole
/// unit on error. The invariant check at the end is defensive — lifecycle
/// preconditions should make it unreachable.
pub fn apply_adjustment(
    schedule: &Schedule,
    adjustment: &InventoryAdjustment,
) -> Result<Schedule, InventoryError> {
    if schedule.id != adjustment.schedule_id {
        return Err(InventoryError::WrongSchedule {
            expected: adjustment.schedule_id,
            actual: schedule.id,
        });
    }

    let mut next = schedule.clone();
    match &adjustment.delta {
        SeatDelta::Hold { seats } => {
            if let Some(taken) = seats.iter().find(|s| next.booked_seats.contains(*s)) {
                return Err(InventoryError::SeatAlreadyBooked(taken.clone()));
            }
            if (next.available_seats as usize) < seats.len() {
                return Err(InventoryError::InsufficientSeats {
                    requested: seats.len(),
                    available: next.available_seats,
                });
            }
            next.available_seats -= seats.len() as u32;
            next.booked_seats.extend(seats.iter().cloned());
        }
        SeatDelta::Release { seat_delta, seats } => {
            next.booked_seats = &next.booked_seats - seats;
            let recomputed = next.available_seats as i64 + *seat_delta as i64;
            if recomputed < 0 || recomputed > next.capacity as i64 {
                return Err(InventoryError::InvariantViolated {
                    schedule_id: schedule.id,
                    detail: format!(
                        "available would become {recomputed} with capacity {}",
                        next.capacity
                    ),
                });
            }
            next.available_seats = recomputed as u32;
        }
    }

    if !next.capacity_invariant_holds() {
        return Err(InventoryError::InvariantViolated {
            schedule_id: schedule.id,
            detail: format!(
                "available {} + booked {} != capacity {}",
                next.available_seats,
                next.booked_seats.len(),
                next.capacity
            ),
        });
    }

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn schedule(available: u32, booked: &[&str], capacity: u32) -> Schedule {
        Schedule {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            bus_id: Uuid::new_v4(),
            route_id: Uuid::new_v4(),
            departure_at: Utc::now() + Duration::hours(4),
            arrival_at: Utc::now() + Duration::hours(9),
            seat_price: 85_000,
            capacity,
            available_seats: available,
            booked_seats: booked.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn hold_takes_seats_out_of_availability() {
        let s = schedule(40, &[], 40);
        let adj = InventoryAdjustment::hold(s.id, ["A1".to_string(), "A2".to_string()]);
        let next = apply_adjustment(&s, &adj).unwrap();
        assert_eq!(next.available_seats, 38);
        assert!(next.booked_seats.contains("A1"));
        assert!(next.capacity_invariant_holds());
    }

    #[test]
    fn hold_rejects_already_booked_seat() {
        let s = schedule(38, &["A1", "A2"], 40);
        let adj = InventoryAdjustment::hold(s.id, ["A2".to_string()]);
        assert!(matches!(
            apply_adjustment(&s, &adj),
            Err(InventoryError::SeatAlreadyBooked(seat)) if seat == "A2"
        ));
    }

    #[test]
    fn hold_rejects_overdraw() {
        let s = schedule(1, &[], 1);
        let adj = InventoryAdjustment::hold(s.id, ["B1".to_string(), "B2".to_string()]);
        assert!(matches!(
            apply_adjustment(&s, &adj),
            Err(InventoryError::InsufficientSeats { requested: 2, available: 1 })
        ));
    }

    #[test]
    fn release_returns_exactly_the_named_seats() {
        let s = schedule(38, &["A1", "A2"], 40);
        let adj = InventoryAdjustment::release(s.id, ["A1".to_string(), "A2".to_string()]);
        let next = apply_adjustment(&s, &adj).unwrap();
        assert_eq!(next.available_seats, 40);
        assert!(next.booked_seats.is_empty());
    }

    #[test]
    fn duplicate_release_aborts_instead_of_corrupting() {
        let s = schedule(38, &["A1", "A2"], 40);
        let once = apply_adjustment(&s, &InventoryAdjustment::release(s.id, ["A1".to_string()]))
            .unwrap();
        // Releasing A1 again: the set-difference removes nothing, so the
        // asserted delta would push available past capacity-consistency.
        let again = apply_adjustment(&once, &InventoryAdjustment::release(s.id, ["A1".to_string()]));
        assert!(matches!(again, Err(InventoryError::InvariantViolated { .. })));
    }

    #[test]
    fn release_never_exceeds_capacity() {
        let s = schedule(40, &[], 40);
        let adj = InventoryAdjustment {
            schedule_id: s.id,
            delta: SeatDelta::Release { seat_delta: 1, seats: BTreeSet::new() },
        };
        assert!(matches!(
            apply_adjustment(&s, &adj),
            Err(InventoryError::InvariantViolated { .. })
        ));
    }

    #[test]
    fn wrong_schedule_is_refused() {
        let s = schedule(40, &[], 40);
        let adj = InventoryAdjustment::release(Uuid::new_v4(), ["A1".to_string()]);
        assert!(matches!(
            apply_adjustment(&s, &adj),
            Err(InventoryError::WrongSchedule { .. })
        ));
    }
}
