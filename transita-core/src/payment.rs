use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use transita_shared::Masked;
use uuid::Uuid;

/// Payment method chosen by the customer at checkout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Card,
    Wallet,
    BankTransfer,
}

/// External gateways the engine can settle against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    Stripe,
    Fonepay,
}

impl GatewayKind {
    /// Static method → gateway mapping. A pure lookup, no side effects:
    /// card traffic goes to Stripe, everything else to Fonepay.
    pub fn for_method(method: PaymentMethod) -> Self {
        match method {
            PaymentMethod::Card => GatewayKind::Stripe,
            PaymentMethod::Wallet | PaymentMethod::BankTransfer => GatewayKind::Fonepay,
        }
    }
}

impl std::fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayKind::Stripe => write!(f, "stripe"),
            GatewayKind::Fonepay => write!(f, "fonepay"),
        }
    }
}

/// Normalized customer contact handed to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerContact {
    pub name: String,
    pub email: Masked<String>,
    pub phone: Masked<String>,
}

/// Checkout request wire contract. Trip metadata rides along so the gateway
/// can render a meaningful payment page.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRequest {
    pub booking_id: Uuid,
    pub gateway: GatewayKind,
    pub contact: CustomerContact,
    pub route_label: String,
    /// Departure as an ISO-8601 timestamp.
    pub departure_iso: String,
    pub passenger_count: u32,
    /// Seat codes, comma-joined ("A1,A2").
    pub seats: String,
    /// Minor currency units.
    pub amount: i64,
}

/// Checkout response wire contract.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutResponse {
    pub success: bool,
    pub checkout_url: Option<String>,
    pub error: Option<String>,
}

/// Authoritative settlement state reported by a gateway for one transaction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    Paid,
    Failed,
    Pending,
}

/// Result of polling a gateway for a transaction. The gateway owns the
/// transaction → booking mapping, so the booking id comes back with it.
#[derive(Debug, Clone)]
pub struct SettlementResult {
    pub booking_id: Uuid,
    pub status: SettlementStatus,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Network-level failure talking to the provider. Retryable.
    #[error("gateway transport failure: {0}")]
    Transport(String),

    /// The provider understood the request and said no.
    #[error("gateway rejected request: {0}")]
    Rejected(String),

    /// The provider does not recognize the transaction identifier.
    #[error("unknown transaction: {0}")]
    UnknownTransaction(String),
}

/// Adapter over one external payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn kind(&self) -> GatewayKind;

    /// Open a checkout session; returns a redirect handle on success.
    async fn create_checkout(&self, req: &CheckoutRequest) -> Result<CheckoutResponse, GatewayError>;

    /// Poll or confirm the settlement state of a transaction.
    async fn verify_transaction(&self, transaction_id: &str) -> Result<SettlementResult, GatewayError>;
}
