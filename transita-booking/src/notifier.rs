use crate::models::{Booking, BookingStatus, PaymentStatus};
use crate::repository::BookingChanged;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use transita_core::notify::NotificationSink;
use transita_shared::models::events::{PaymentChangedEvent, StatusChangedEvent};
use uuid::Uuid;

/// What the notifier pushes to the live stream (and, via the sink, to the
/// user's device).
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UserNotification {
    StatusChanged(StatusChangedEvent),
    PaymentChanged(PaymentChangedEvent),
}

impl UserNotification {
    pub fn customer_id(&self) -> Uuid {
        match self {
            UserNotification::StatusChanged(e) => e.customer_id,
            UserNotification::PaymentChanged(e) => e.customer_id,
        }
    }
}

/// Outcome of comparing one observed record against the last-known pair.
/// Pure data so the diffing rules stay testable without any delivery side
/// effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedChange {
    Status { from: BookingStatus, to: BookingStatus },
    Payment { from: PaymentStatus, to: PaymentStatus },
}

/// Watches the record-changed feed and reports each transition exactly once.
/// Keeps a map of booking id → last-observed (status, payment) pair; the
/// first observation of a booking seeds the map silently so pre-existing
/// state never floods the user at attach time.
pub struct ChangeNotifier {
    seen: HashMap<Uuid, (BookingStatus, PaymentStatus)>,
    sink: Arc<dyn NotificationSink>,
    stream_tx: broadcast::Sender<UserNotification>,
}

impl ChangeNotifier {
    pub fn new(sink: Arc<dyn NotificationSink>, stream_tx: broadcast::Sender<UserNotification>) -> Self {
        Self { seen: HashMap::new(), sink, stream_tx }
    }

    /// Initial synchronization: register current state without emitting.
    pub fn seed<'a>(&mut self, bookings: impl IntoIterator<Item = &'a Booking>) {
        for booking in bookings {
            self.seen.insert(booking.id, (booking.status, booking.payment_status));
        }
    }

    /// The diffing decision. Updates the map and returns what changed;
    /// performs no I/O. Status and payment changes are independent — both
    /// may come out of a single update.
    pub fn diff(&mut self, change: &BookingChanged) -> Vec<ObservedChange> {
        let after = match &change.after {
            Some(b) => b,
            None => {
                // Deleted record: forget it, nothing to report.
                if let Some(before) = &change.before {
                    self.seen.remove(&before.id);
                }
                return Vec::new();
            }
        };
        let pair = (after.status, after.payment_status);
        match self.seen.insert(after.id, pair) {
            None => Vec::new(),
            Some(prev) => {
                let mut changes = Vec::new();
                if prev.0 != pair.0 {
                    changes.push(ObservedChange::Status { from: prev.0, to: pair.0 });
                }
                if prev.1 != pair.1 {
                    changes.push(ObservedChange::Payment { from: prev.1, to: pair.1 });
                }
                changes
            }
        }
    }

    /// Diff one feed event and emit whatever transitions it carried.
    pub async fn observe(&mut self, change: BookingChanged) {
        let changes = self.diff(&change);
        // diff() only returns changes when `after` is present.
        let Some(booking) = change.after else { return };
        for observed in changes {
            let notification = self.to_notification(&booking, &observed);
            let (title, message) = describe(&booking, &observed);
            self.sink
                .deliver(
                    booking.customer_id,
                    &title,
                    &message,
                    Some(&format!("/bookings/{}", booking.id)),
                )
                .await;
            // Nobody listening on the stream is fine; delivery is best-effort.
            let _ = self.stream_tx.send(notification);
        }
    }

    fn to_notification(&self, booking: &Booking, observed: &ObservedChange) -> UserNotification {
        let timestamp = Utc::now().timestamp();
        match observed {
            ObservedChange::Status { from, to } => {
                UserNotification::StatusChanged(StatusChangedEvent {
                    booking_id: booking.id,
                    customer_id: booking.customer_id,
                    reference: booking.reference.clone(),
                    old_status: from.to_string(),
                    new_status: to.to_string(),
                    timestamp,
                })
            }
            ObservedChange::Payment { from, to } => {
                UserNotification::PaymentChanged(PaymentChangedEvent {
                    booking_id: booking.id,
                    customer_id: booking.customer_id,
                    reference: booking.reference.clone(),
                    old_status: from.to_string(),
                    new_status: to.to_string(),
                    timestamp,
                })
            }
        }
    }

    /// Consume the feed until the store side closes. Lag means the channel
    /// overflowed; transitions inside the gap are lost to this listener, so
    /// it is logged rather than silently swallowed.
    pub async fn run(mut self, mut feed: broadcast::Receiver<BookingChanged>) {
        loop {
            match feed.recv().await {
                Ok(change) => self.observe(change).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "change notifier lagged behind the feed");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

fn describe(booking: &Booking, observed: &ObservedChange) -> (String, String) {
    match observed {
        ObservedChange::Status { to, .. } => (
            "Booking update".to_string(),
            format!("Booking {} is now {}", booking.reference, to),
        ),
        ObservedChange::Payment { to, .. } => (
            "Payment update".to_string(),
            format!("Payment for booking {} is now {}", booking.reference, to),
        ),
    }
}
