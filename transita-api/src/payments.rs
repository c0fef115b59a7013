use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};
use transita_booking::models::{BookingStatus, PaymentStatus};
use transita_booking::reconcile::CheckoutHandle;
use transita_core::payment::{CustomerContact, GatewayKind, PaymentMethod, SettlementStatus};
use transita_shared::Masked;
use uuid::Uuid;

use crate::auth::{customer_id, decode_claims};
use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings/{id}/payments/initiate", post(initiate_payment))
        .route("/v1/payments/verify", post(verify_payment))
        .route("/v1/webhooks/payments/{gateway}", post(payment_webhook))
}

#[derive(Debug, Deserialize)]
struct InitiatePaymentRequest {
    method: PaymentMethod,
    contact: ContactInput,
}

#[derive(Debug, Deserialize)]
struct ContactInput {
    name: String,
    email: String,
    phone: String,
}

#[derive(Debug, Deserialize)]
struct VerifyPaymentRequest {
    gateway: GatewayKind,
    transaction_id: String,
}

#[derive(Debug, Serialize)]
struct VerifyPaymentResponse {
    booking_id: Uuid,
    status: SettlementStatus,
    booking_status: BookingStatus,
    payment_status: PaymentStatus,
}

/// Gateway callback body. Providers post richer envelopes; the transaction
/// identifier is the part reconciliation needs.
#[derive(Debug, Deserialize)]
struct WebhookPayload {
    transaction_id: String,
}

/// POST /v1/bookings/{id}/payments/initiate
/// Open a checkout session with the gateway selected by the payment method.
/// A failure here leaves the booking untouched and retryable.
async fn initiate_payment(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<InitiatePaymentRequest>,
) -> Result<Json<CheckoutHandle>, AppError> {
    let claims = decode_claims(bearer.token(), &state.auth.secret)?;
    let caller = customer_id(&claims)?;

    let vb = state
        .store
        .booking(booking_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("booking {booking_id}")))?;
    if vb.booking.customer_id != caller {
        return Err(AppError::AuthorizationError("booking does not belong to you".into()));
    }

    let contact = CustomerContact {
        name: req.contact.name,
        email: Masked(req.contact.email),
        phone: Masked(req.contact.phone),
    };
    let handle = state.reconciler.initiate(booking_id, req.method, contact).await?;
    Ok(Json(handle))
}

/// POST /v1/payments/verify
/// Poll the gateway for a transaction and reconcile the booking. Safe to
/// call any number of times.
async fn verify_payment(
    State(state): State<AppState>,
    TypedHeader(Authorization(_bearer)): TypedHeader<Authorization<Bearer>>,
    Json(req): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, AppError> {
    let (status, booking) = state.reconciler.verify(req.gateway, &req.transaction_id).await?;
    Ok(Json(VerifyPaymentResponse {
        booking_id: booking.id,
        status,
        booking_status: booking.status,
        payment_status: booking.payment_status,
    }))
}

/// POST /v1/webhooks/payments/{gateway}
/// Asynchronous gateway callback; runs the same reconciliation path as
/// customer-driven verify, so replays are harmless.
async fn payment_webhook(
    State(state): State<AppState>,
    Path(gateway): Path<GatewayKind>,
    Json(payload): Json<WebhookPayload>,
) -> Result<StatusCode, AppError> {
    tracing::info!(%gateway, transaction_id = %payload.transaction_id, "payment webhook received");
    let (status, booking) = state.reconciler.verify(gateway, &payload.transaction_id).await?;
    tracing::info!(booking_id = %booking.id, ?status, "webhook reconciled");
    Ok(StatusCode::OK)
}
