use crate::models::{Booking, BookingStatus, PaymentStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use transita_core::payment::SettlementStatus;
use transita_inventory::{InventoryAdjustment, Schedule};

/// A decided transition: the booking's next value plus the inventory change
/// that must commit in the same atomic unit. Pure data — the engine applies it.
#[derive(Debug, Clone)]
pub struct Transition {
    pub booking: Booking,
    pub inventory: Option<InventoryAdjustment>,
}

/// What a customer cancel actually did.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// Unpaid booking: cancelled outright, seats released.
    Cancelled,
    /// Paid booking: refund eligibility is adjudicated by an admin, so only
    /// the request flag is set and the seats stay held.
    CancellationRequested,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("schedule has already departed")]
    DepartureInPast,

    #[error("schedule has not departed yet")]
    DepartureNotReached,

    #[error("{action} not allowed from {status}/{payment}")]
    WrongState {
        action: &'static str,
        status: BookingStatus,
        payment: PaymentStatus,
    },

    #[error("no cancellation request pending on this booking")]
    NoCancellationRequested,

    #[error("only cancelled bookings can be deleted")]
    DeleteRequiresCancelled,
}

fn wrong_state(action: &'static str, booking: &Booking) -> LifecycleError {
    LifecycleError::WrongState {
        action,
        status: booking.status,
        payment: booking.payment_status,
    }
}

/// Admin approves a pending reservation: (pending, pending) → (confirmed, pending).
pub fn confirm(booking: &Booking) -> Result<Transition, LifecycleError> {
    if booking.status != BookingStatus::Pending {
        return Err(wrong_state("confirm", booking));
    }
    let mut next = booking.clone();
    next.status = BookingStatus::Confirmed;
    next.touch();
    Ok(Transition { booking: next, inventory: None })
}

/// Admin turns a pending reservation down. Terminal for the seats: the
/// booking is cancelled and its seats return to the pool in the same unit.
pub fn reject(booking: &Booking, schedule: &Schedule) -> Result<Transition, LifecycleError> {
    if booking.status != BookingStatus::Pending {
        return Err(wrong_state("reject", booking));
    }
    let mut next = booking.clone();
    next.status = BookingStatus::Cancelled;
    next.touch();
    Ok(Transition {
        booking: next,
        inventory: Some(InventoryAdjustment::release(
            schedule.id,
            booking.seat_numbers.iter().cloned(),
        )),
    })
}

/// Customer cancel. Pre-payment this cancels outright and releases seats;
/// post-payment it only records a cancellation request and holds the seats
/// until an admin adjudicates the refund.
pub fn cancel(
    booking: &Booking,
    schedule: &Schedule,
    now: DateTime<Utc>,
) -> Result<(Transition, CancelOutcome), LifecycleError> {
    if schedule.has_departed(now) {
        return Err(LifecycleError::DepartureInPast);
    }
    match (booking.status, booking.payment_status) {
        (BookingStatus::Cancelled, _) | (BookingStatus::Completed, _) => {
            Err(wrong_state("cancel", booking))
        }
        (BookingStatus::Confirmed, PaymentStatus::Paid) => {
            let mut next = booking.clone();
            next.cancellation_requested = true;
            next.touch();
            Ok((
                Transition { booking: next, inventory: None },
                CancelOutcome::CancellationRequested,
            ))
        }
        (BookingStatus::Pending | BookingStatus::Confirmed, _) => {
            let mut next = booking.clone();
            next.status = BookingStatus::Cancelled;
            next.touch();
            Ok((
                Transition {
                    booking: next,
                    inventory: Some(InventoryAdjustment::release(
                        schedule.id,
                        booking.seat_numbers.iter().cloned(),
                    )),
                },
                CancelOutcome::Cancelled,
            ))
        }
    }
}

/// Admin approves a customer's cancellation request on a paid booking:
/// (confirmed, paid, requested) → (cancelled, paid) and the seats release.
/// Refund settlement happens outside this engine, so payment stays Paid.
pub fn approve_cancellation(
    booking: &Booking,
    schedule: &Schedule,
) -> Result<Transition, LifecycleError> {
    if booking.status != BookingStatus::Confirmed
        || booking.payment_status != PaymentStatus::Paid
    {
        return Err(wrong_state("approve_cancellation", booking));
    }
    if !booking.cancellation_requested {
        return Err(LifecycleError::NoCancellationRequested);
    }
    let mut next = booking.clone();
    next.status = BookingStatus::Cancelled;
    next.touch();
    Ok(Transition {
        booking: next,
        inventory: Some(InventoryAdjustment::release(
            schedule.id,
            booking.seat_numbers.iter().cloned(),
        )),
    })
}

/// Fold a gateway settlement result into the booking. Returns Ok(None) when
/// there is nothing to apply — already paid, or a pending poll — which is
/// what makes `verify` idempotent. Booking status is never altered here.
pub fn settle_payment(
    booking: &Booking,
    outcome: SettlementStatus,
) -> Result<Option<Transition>, LifecycleError> {
    if booking.status != BookingStatus::Confirmed {
        return Err(wrong_state("settle_payment", booking));
    }
    if booking.payment_status == PaymentStatus::Paid {
        return Ok(None);
    }
    let target = match outcome {
        SettlementStatus::Paid => PaymentStatus::Paid,
        SettlementStatus::Failed => PaymentStatus::Failed,
        SettlementStatus::Pending => return Ok(None),
    };
    if booking.payment_status == target {
        return Ok(None);
    }
    let mut next = booking.clone();
    next.payment_status = target;
    next.touch();
    Ok(Some(Transition { booking: next, inventory: None }))
}

/// Customer removes a cancelled booking record. Inventory is untouched:
/// the seats already went back at cancellation time.
pub fn validate_delete(booking: &Booking) -> Result<(), LifecycleError> {
    if booking.status != BookingStatus::Cancelled {
        return Err(LifecycleError::DeleteRequiresCancelled);
    }
    Ok(())
}

/// Admin closes out a fully-paid booking once the trip has run.
pub fn complete(
    booking: &Booking,
    schedule: &Schedule,
    now: DateTime<Utc>,
) -> Result<Transition, LifecycleError> {
    if booking.status != BookingStatus::Confirmed
        || booking.payment_status != PaymentStatus::Paid
    {
        return Err(wrong_state("complete", booking));
    }
    if !schedule.has_departed(now) {
        return Err(LifecycleError::DepartureNotReached);
    }
    let mut next = booking.clone();
    next.status = BookingStatus::Completed;
    next.touch();
    Ok(Transition { booking: next, inventory: None })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Gender, PassengerDetail};
    use chrono::Duration;
    use std::collections::BTreeSet;
    use transita_inventory::SeatDelta;
    use uuid::Uuid;

    fn schedule_departing_in(hours: i64) -> Schedule {
        Schedule {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            bus_id: Uuid::new_v4(),
            route_id: Uuid::new_v4(),
            departure_at: Utc::now() + Duration::hours(hours),
            arrival_at: Utc::now() + Duration::hours(hours + 7),
            seat_price: 120_000,
            capacity: 40,
            available_seats: 38,
            booked_seats: ["A1", "A2"].iter().map(|s| s.to_string()).collect(),
        }
    }

    fn booking_on(schedule: &Schedule) -> Booking {
        Booking::new(
            Uuid::new_v4(),
            schedule.id,
            schedule.company_id,
            vec![
                PassengerDetail {
                    name: "Asha".into(),
                    age: 29,
                    gender: Gender::Female,
                    seat_number: "A1".into(),
                },
                PassengerDetail {
                    name: "Bimal".into(),
                    age: 31,
                    gender: Gender::Male,
                    seat_number: "A2".into(),
                },
            ],
            240_000,
        )
        .unwrap()
    }

    fn released(t: &Transition) -> BTreeSet<String> {
        match &t.inventory.as_ref().unwrap().delta {
            SeatDelta::Release { seats, .. } => seats.clone(),
            SeatDelta::Hold { .. } => panic!("expected a release"),
        }
    }

    #[test]
    fn confirm_moves_pending_to_confirmed() {
        let s = schedule_departing_in(6);
        let b = booking_on(&s);
        let t = confirm(&b).unwrap();
        assert_eq!(t.booking.status, BookingStatus::Confirmed);
        assert_eq!(t.booking.payment_status, PaymentStatus::Pending);
        assert!(t.inventory.is_none());
    }

    #[test]
    fn confirm_refuses_non_pending() {
        let s = schedule_departing_in(6);
        let mut b = booking_on(&s);
        b.status = BookingStatus::Confirmed;
        assert!(matches!(confirm(&b), Err(LifecycleError::WrongState { .. })));
    }

    #[test]
    fn reject_cancels_and_releases() {
        let s = schedule_departing_in(6);
        let b = booking_on(&s);
        let t = reject(&b, &s).unwrap();
        assert_eq!(t.booking.status, BookingStatus::Cancelled);
        assert_eq!(
            released(&t),
            ["A1", "A2"].iter().map(|x| x.to_string()).collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn cancel_unpaid_releases_seats_synchronously() {
        let s = schedule_departing_in(6);
        let mut b = booking_on(&s);
        b.status = BookingStatus::Confirmed;
        let (t, outcome) = cancel(&b, &s, Utc::now()).unwrap();
        assert_eq!(outcome, CancelOutcome::Cancelled);
        assert_eq!(t.booking.status, BookingStatus::Cancelled);
        assert_eq!(released(&t).len(), 2);
    }

    #[test]
    fn cancel_paid_only_requests() {
        let s = schedule_departing_in(6);
        let mut b = booking_on(&s);
        b.status = BookingStatus::Confirmed;
        b.payment_status = PaymentStatus::Paid;
        let (t, outcome) = cancel(&b, &s, Utc::now()).unwrap();
        assert_eq!(outcome, CancelOutcome::CancellationRequested);
        assert!(t.booking.cancellation_requested);
        assert_eq!(t.booking.status, BookingStatus::Confirmed);
        assert_eq!(t.booking.payment_status, PaymentStatus::Paid);
        assert!(t.inventory.is_none());
    }

    #[test]
    fn cancel_after_departure_is_refused() {
        let s = schedule_departing_in(-1);
        let b = booking_on(&s);
        assert!(matches!(
            cancel(&b, &s, Utc::now()),
            Err(LifecycleError::DepartureInPast)
        ));
    }

    #[test]
    fn cancel_refuses_terminal_states() {
        let s = schedule_departing_in(6);
        let mut b = booking_on(&s);
        b.status = BookingStatus::Cancelled;
        assert!(matches!(
            cancel(&b, &s, Utc::now()),
            Err(LifecycleError::WrongState { .. })
        ));
    }

    #[test]
    fn approve_cancellation_needs_a_request() {
        let s = schedule_departing_in(6);
        let mut b = booking_on(&s);
        b.status = BookingStatus::Confirmed;
        b.payment_status = PaymentStatus::Paid;
        assert!(matches!(
            approve_cancellation(&b, &s),
            Err(LifecycleError::NoCancellationRequested)
        ));

        b.cancellation_requested = true;
        let t = approve_cancellation(&b, &s).unwrap();
        assert_eq!(t.booking.status, BookingStatus::Cancelled);
        // Refund is settled outside; payment state is not rewritten here.
        assert_eq!(t.booking.payment_status, PaymentStatus::Paid);
        assert_eq!(released(&t).len(), 2);
    }

    #[test]
    fn settle_payment_is_idempotent_after_paid() {
        let s = schedule_departing_in(6);
        let mut b = booking_on(&s);
        b.status = BookingStatus::Confirmed;

        let t = settle_payment(&b, SettlementStatus::Paid).unwrap().unwrap();
        assert_eq!(t.booking.payment_status, PaymentStatus::Paid);
        assert_eq!(t.booking.status, BookingStatus::Confirmed);

        // Second settlement of the same transaction: nothing to apply.
        assert!(settle_payment(&t.booking, SettlementStatus::Paid).unwrap().is_none());
        // A late Failed report never downgrades a paid booking.
        assert!(settle_payment(&t.booking, SettlementStatus::Failed).unwrap().is_none());
    }

    #[test]
    fn settle_payment_records_failure() {
        let s = schedule_departing_in(6);
        let mut b = booking_on(&s);
        b.status = BookingStatus::Confirmed;
        let t = settle_payment(&b, SettlementStatus::Failed).unwrap().unwrap();
        assert_eq!(t.booking.payment_status, PaymentStatus::Failed);
    }

    #[test]
    fn settle_payment_pending_is_a_noop() {
        let s = schedule_departing_in(6);
        let mut b = booking_on(&s);
        b.status = BookingStatus::Confirmed;
        assert!(settle_payment(&b, SettlementStatus::Pending).unwrap().is_none());
    }

    #[test]
    fn settle_payment_requires_confirmed() {
        let s = schedule_departing_in(6);
        let b = booking_on(&s);
        assert!(matches!(
            settle_payment(&b, SettlementStatus::Paid),
            Err(LifecycleError::WrongState { .. })
        ));
    }

    #[test]
    fn delete_requires_cancelled() {
        let s = schedule_departing_in(6);
        let mut b = booking_on(&s);
        assert!(matches!(
            validate_delete(&b),
            Err(LifecycleError::DeleteRequiresCancelled)
        ));
        b.status = BookingStatus::Cancelled;
        assert!(validate_delete(&b).is_ok());
    }

    #[test]
    fn complete_requires_paid_and_departed() {
        let mut s = schedule_departing_in(6);
        let mut b = booking_on(&s);
        b.status = BookingStatus::Confirmed;
        b.payment_status = PaymentStatus::Paid;
        assert!(matches!(
            complete(&b, &s, Utc::now()),
            Err(LifecycleError::DepartureNotReached)
        ));

        s.departure_at = Utc::now() - Duration::hours(2);
        let t = complete(&b, &s, Utc::now()).unwrap();
        assert_eq!(t.booking.status, BookingStatus::Completed);
        assert!(t.inventory.is_none());
    }
}
