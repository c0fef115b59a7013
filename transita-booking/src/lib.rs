pub mod cache;
pub mod engine;
pub mod lifecycle;
pub mod models;
pub mod notifier;
pub mod reconcile;
pub mod repository;
pub mod retry;
pub mod view;

pub use engine::{LifecycleEngine, NewBookingRequest};
pub use lifecycle::CancelOutcome;
pub use models::{Booking, BookingStatus, PassengerDetail, PaymentStatus};
pub use notifier::ChangeNotifier;
pub use reconcile::PaymentReconciler;
pub use repository::{BookingChanged, BookingStore, CommitRequest};
pub use view::{BookingPresenter, EnhancedBooking};
