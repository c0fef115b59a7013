use std::sync::Arc;
use tokio::sync::broadcast;
use transita_booking::notifier::UserNotification;
use transita_booking::repository::BookingStore;
use transita_booking::view::SessionCaches;
use transita_booking::{BookingPresenter, LifecycleEngine, PaymentReconciler};
use transita_inventory::ReferenceDirectory;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BookingStore>,
    pub directory: Arc<dyn ReferenceDirectory>,
    pub engine: Arc<LifecycleEngine>,
    pub reconciler: Arc<PaymentReconciler>,
    pub presenter: Arc<BookingPresenter>,
    pub caches: Arc<SessionCaches>,
    pub notify_tx: broadcast::Sender<UserNotification>,
    pub auth: AuthConfig,
}
