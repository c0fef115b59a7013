use uuid::Uuid;

/// User-facing event emitted when a booking's status moves.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct StatusChangedEvent {
    pub booking_id: Uuid,
    pub customer_id: Uuid,
    pub reference: String,
    pub old_status: String,
    pub new_status: String,
    pub timestamp: i64,
}

/// User-facing event emitted when a booking's payment status moves.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct PaymentChangedEvent {
    pub booking_id: Uuid,
    pub customer_id: Uuid,
    pub reference: String,
    pub old_status: String,
    pub new_status: String,
    pub timestamp: i64,
}
