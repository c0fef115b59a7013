use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use transita_booking::engine::NewBookingRequest;
use transita_booking::lifecycle::CancelOutcome;
use transita_booking::models::{Booking, Gender, PassengerDetail};
use transita_booking::view::EnhancedBooking;
use uuid::Uuid;

use crate::auth::{customer_id, decode_claims, require_admin, Claims};
use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", get(list_bookings).post(create_booking))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
        .route("/v1/bookings/{id}", delete(delete_booking))
        .route("/v1/admin/bookings/{id}/confirm", post(admin_confirm))
        .route("/v1/admin/bookings/{id}/reject", post(admin_reject))
        .route(
            "/v1/admin/bookings/{id}/approve-cancellation",
            post(admin_approve_cancellation),
        )
        .route("/v1/admin/bookings/{id}/complete", post(admin_complete))
}

#[derive(Debug, Deserialize)]
struct CreateBookingRequest {
    schedule_id: Uuid,
    passengers: Vec<PassengerInput>,
}

#[derive(Debug, Deserialize)]
struct PassengerInput {
    name: String,
    age: u8,
    gender: Gender,
    seat_number: String,
}

#[derive(Debug, Serialize)]
struct BookingResponse {
    id: Uuid,
    reference: String,
    schedule_id: Uuid,
    status: String,
    payment_status: String,
    cancellation_requested: bool,
    seat_numbers: Vec<String>,
    total_amount: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<&Booking> for BookingResponse {
    fn from(b: &Booking) -> Self {
        Self {
            id: b.id,
            reference: b.reference.clone(),
            schedule_id: b.schedule_id,
            status: b.status.to_string(),
            payment_status: b.payment_status.to_string(),
            cancellation_requested: b.cancellation_requested,
            seat_numbers: b.seat_numbers.clone(),
            total_amount: b.total_amount,
            created_at: b.created_at,
            updated_at: b.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct CancelResponse {
    outcome: CancelOutcome,
    booking: BookingResponse,
}

fn claims_from(bearer: &Bearer, state: &AppState) -> Result<Claims, AppError> {
    decode_claims(bearer.token(), &state.auth.secret)
}

/// The booking must exist and belong to the bearer.
async fn owned_booking(
    state: &AppState,
    claims: &Claims,
    booking_id: Uuid,
) -> Result<Booking, AppError> {
    let caller = customer_id(claims)?;
    let vb = state
        .store
        .booking(booking_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("booking {booking_id}")))?;
    if vb.booking.customer_id != caller {
        return Err(AppError::AuthorizationError(
            "booking does not belong to you".to_string(),
        ));
    }
    Ok(vb.booking)
}

/// GET /v1/bookings
/// The bearer's bookings, joined with schedule/bus/route/company context.
async fn list_bookings(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Vec<EnhancedBooking>>, AppError> {
    let claims = claims_from(&bearer, &state)?;
    let caller = customer_id(&claims)?;
    let enhanced = state.presenter.enhanced_bookings(caller).await?;
    Ok(Json(enhanced))
}

/// POST /v1/bookings
/// Reserve seats on a schedule.
async fn create_booking(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let claims = claims_from(&bearer, &state)?;
    let caller = customer_id(&claims)?;

    if req.passengers.is_empty() {
        return Err(AppError::ValidationError("at least one passenger is required".into()));
    }
    let passengers = req
        .passengers
        .into_iter()
        .map(|p| PassengerDetail {
            name: p.name,
            age: p.age,
            gender: p.gender,
            seat_number: p.seat_number,
        })
        .collect();

    let booking = state
        .engine
        .create(NewBookingRequest {
            customer_id: caller,
            schedule_id: req.schedule_id,
            passengers,
        })
        .await?;

    info!(booking_id = %booking.id, reference = %booking.reference, "booking created via API");
    Ok((StatusCode::CREATED, Json(BookingResponse::from(&booking))))
}

/// POST /v1/bookings/{id}/cancel
/// Outcome tells the caller whether this was a hard cancel or only a
/// cancellation request on a paid booking.
async fn cancel_booking(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<CancelResponse>, AppError> {
    let claims = claims_from(&bearer, &state)?;
    owned_booking(&state, &claims, booking_id).await?;

    let (booking, outcome) = state.engine.cancel(booking_id).await?;
    Ok(Json(CancelResponse { outcome, booking: BookingResponse::from(&booking) }))
}

/// DELETE /v1/bookings/{id}
/// Only cancelled bookings can be removed.
async fn delete_booking(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Path(booking_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let claims = claims_from(&bearer, &state)?;
    owned_booking(&state, &claims, booking_id).await?;

    state.engine.delete_cancelled(booking_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/admin/bookings/{id}/confirm
async fn admin_confirm(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let claims = claims_from(&bearer, &state)?;
    require_admin(&claims)?;
    let booking = state.engine.confirm(booking_id).await?;
    Ok(Json(BookingResponse::from(&booking)))
}

/// POST /v1/admin/bookings/{id}/reject
async fn admin_reject(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let claims = claims_from(&bearer, &state)?;
    require_admin(&claims)?;
    let booking = state.engine.reject(booking_id).await?;
    Ok(Json(BookingResponse::from(&booking)))
}

/// POST /v1/admin/bookings/{id}/approve-cancellation
/// Adjudicate a refund request on a paid booking; this is the step that
/// finally releases the seats.
async fn admin_approve_cancellation(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let claims = claims_from(&bearer, &state)?;
    require_admin(&claims)?;
    let booking = state.engine.approve_cancellation(booking_id).await?;
    Ok(Json(BookingResponse::from(&booking)))
}

/// POST /v1/admin/bookings/{id}/complete
async fn admin_complete(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let claims = claims_from(&bearer, &state)?;
    require_admin(&claims)?;
    let booking = state.engine.complete(booking_id).await?;
    Ok(Json(BookingResponse::from(&booking)))
}
