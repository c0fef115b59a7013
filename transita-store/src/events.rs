use tokio::sync::broadcast;
use transita_booking::repository::BookingChanged;

/// The record-changed feed: every committed atomic unit publishes one
/// before/after snapshot here. The change notifier and any live listeners
/// subscribe; with nobody attached events are simply dropped.
#[derive(Clone)]
pub struct BookingFeed {
    tx: broadcast::Sender<BookingChanged>,
}

impl BookingFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: BookingChanged) {
        // Err here only means no subscribers; that is a valid state.
        if self.tx.send(event).is_err() {
            tracing::trace!("booking feed has no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookingChanged> {
        self.tx.subscribe()
    }
}

impl Default for BookingFeed {
    fn default() -> Self {
        Self::new(256)
    }
}
