use crate::engine::LifecycleEngine;
use crate::models::{Booking, BookingStatus, PaymentStatus};
use crate::repository::BookingStore;
use crate::retry;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use transita_core::payment::{
    CheckoutRequest, CheckoutResponse, CustomerContact, GatewayError, GatewayKind,
    PaymentGateway, PaymentMethod, SettlementResult, SettlementStatus,
};
use transita_core::{CoreError, CoreResult};
use transita_inventory::ReferenceDirectory;
use uuid::Uuid;

const INITIATE_ATTEMPTS: u32 = 3;
const INITIATE_BASE_DELAY: Duration = Duration::from_millis(200);

/// Redirect handle returned to the customer after a successful initiate.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckoutHandle {
    pub gateway: GatewayKind,
    pub checkout_url: String,
}

/// Brings booking payment state in line with the gateway's authoritative
/// settlement result. Holds one adapter per gateway; selection is the static
/// method → gateway mapping, nothing dynamic.
pub struct PaymentReconciler {
    store: Arc<dyn BookingStore>,
    directory: Arc<dyn ReferenceDirectory>,
    engine: Arc<LifecycleEngine>,
    gateways: HashMap<GatewayKind, Arc<dyn PaymentGateway>>,
}

fn gateway_to_core(err: GatewayError) -> CoreError {
    match err {
        GatewayError::Transport(msg) => CoreError::Transient(msg),
        GatewayError::Rejected(msg) => CoreError::GatewayRejected(msg),
        GatewayError::UnknownTransaction(id) => CoreError::NotFound(format!("transaction {id}")),
    }
}

impl PaymentReconciler {
    pub fn new(
        store: Arc<dyn BookingStore>,
        directory: Arc<dyn ReferenceDirectory>,
        engine: Arc<LifecycleEngine>,
    ) -> Self {
        Self { store, directory, engine, gateways: HashMap::new() }
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.kind(), gateway);
        self
    }

    fn gateway(&self, kind: GatewayKind) -> CoreResult<&Arc<dyn PaymentGateway>> {
        self.gateways
            .get(&kind)
            .ok_or_else(|| CoreError::Internal(format!("no adapter registered for {kind}")))
    }

    /// Open a checkout session for a confirmed, unpaid booking. Any failure
    /// here — transport, rejection, timeout — leaves the booking exactly as
    /// it was; the customer is free to retry until a verify succeeds.
    pub async fn initiate(
        &self,
        booking_id: Uuid,
        method: PaymentMethod,
        contact: CustomerContact,
    ) -> CoreResult<CheckoutHandle> {
        let vb = self
            .store
            .booking(booking_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("booking {booking_id}")))?;
        let booking = vb.booking;
        if booking.status != BookingStatus::Confirmed {
            return Err(CoreError::Precondition(format!(
                "payment can only be initiated on a confirmed booking, not {}",
                booking.status
            )));
        }
        if booking.payment_status == PaymentStatus::Paid {
            return Err(CoreError::Precondition("booking is already paid".into()));
        }

        let vs = self
            .store
            .schedule(booking.schedule_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("schedule {}", booking.schedule_id)))?;
        let route = self
            .directory
            .route(vs.schedule.route_id)
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?
            .ok_or_else(|| CoreError::NotFound(format!("route {}", vs.schedule.route_id)))?;

        let kind = GatewayKind::for_method(method);
        let gateway = self.gateway(kind)?;
        let request = CheckoutRequest {
            booking_id,
            gateway: kind,
            contact,
            route_label: route.label(),
            departure_iso: vs.schedule.departure_at.to_rfc3339(),
            passenger_count: booking.passengers.len() as u32,
            seats: booking.seat_numbers.join(","),
            amount: booking.total_amount,
        };

        let response: CheckoutResponse =
            retry::with_backoff("payment.initiate", INITIATE_ATTEMPTS, INITIATE_BASE_DELAY, || {
                let gateway = gateway.clone();
                let request = request.clone();
                async move { gateway.create_checkout(&request).await.map_err(gateway_to_core) }
            })
            .await?;

        if !response.success {
            return Err(CoreError::GatewayRejected(
                response.error.unwrap_or_else(|| "checkout refused".into()),
            ));
        }
        let checkout_url = response
            .checkout_url
            .ok_or_else(|| CoreError::Internal("gateway returned success without a URL".into()))?;

        tracing::info!(%booking_id, gateway = %kind, "checkout session opened");
        Ok(CheckoutHandle { gateway: kind, checkout_url })
    }

    /// Reconcile one transaction against its gateway. Idempotent end to end:
    /// a transaction that already settled the booking reports the current
    /// state and applies nothing.
    pub async fn verify(
        &self,
        kind: GatewayKind,
        transaction_id: &str,
    ) -> CoreResult<(SettlementStatus, Booking)> {
        let gateway = self.gateway(kind)?;
        let SettlementResult { booking_id, status } = gateway
            .verify_transaction(transaction_id)
            .await
            .map_err(gateway_to_core)?;

        match status {
            SettlementStatus::Pending => {
                let vb = self
                    .store
                    .booking(booking_id)
                    .await?
                    .ok_or_else(|| CoreError::NotFound(format!("booking {booking_id}")))?;
                Ok((SettlementStatus::Pending, vb.booking))
            }
            SettlementStatus::Paid | SettlementStatus::Failed => {
                let booking = self.engine.settle_payment(booking_id, status).await?;
                tracing::info!(%booking_id, ?status, payment = %booking.payment_status, "payment reconciled");
                Ok((status, booking))
            }
        }
    }
}

/// In-process stand-in for a real provider: checkout always succeeds (with
/// trigger names to simulate outages and declines), and the transaction id
/// encodes the booking id the way a provider would keep the mapping on its
/// side.
pub struct MockGateway {
    kind: GatewayKind,
}

impl MockGateway {
    pub fn new(kind: GatewayKind) -> Self {
        Self { kind }
    }

    pub fn transaction_id(booking_id: Uuid) -> String {
        format!("txn-{}", booking_id.simple())
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn kind(&self) -> GatewayKind {
        self.kind
    }

    async fn create_checkout(&self, req: &CheckoutRequest) -> Result<CheckoutResponse, GatewayError> {
        // Trigger names for failure-path tests.
        match req.contact.name.as_str() {
            "fail-transport" => {
                return Err(GatewayError::Transport("simulated gateway outage".into()))
            }
            "fail-reject" => {
                return Ok(CheckoutResponse {
                    success: false,
                    checkout_url: None,
                    error: Some("card declined".into()),
                })
            }
            _ => {}
        }
        let txn = Self::transaction_id(req.booking_id);
        Ok(CheckoutResponse {
            success: true,
            checkout_url: Some(format!("https://checkout.example/{}/{}", self.kind, txn)),
            error: None,
        })
    }

    async fn verify_transaction(&self, transaction_id: &str) -> Result<SettlementResult, GatewayError> {
        // "pending-" / "failed-" prefixes simulate the other settlement
        // answers a provider can give back.
        let (status, raw) = if let Some(rest) = transaction_id.strip_prefix("pending-") {
            (SettlementStatus::Pending, rest)
        } else if let Some(rest) = transaction_id.strip_prefix("failed-") {
            (SettlementStatus::Failed, rest)
        } else {
            (SettlementStatus::Paid, transaction_id)
        };
        let raw = raw
            .strip_prefix("txn-")
            .ok_or_else(|| GatewayError::UnknownTransaction(transaction_id.to_string()))?;
        let booking_id = Uuid::parse_str(raw)
            .map_err(|_| GatewayError::UnknownTransaction(transaction_id.to_string()))?;
        Ok(SettlementResult { booking_id, status })
    }
}
