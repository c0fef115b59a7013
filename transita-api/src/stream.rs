use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use futures_util::{Stream, StreamExt};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use transita_booking::notifier::UserNotification;

use crate::auth::{customer_id, decode_claims};
use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/notifications/stream", get(notification_stream))
}

/// GET /v1/notifications/stream
/// Live SSE feed of the bearer's booking/payment change events.
async fn notification_stream(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let claims = decode_claims(bearer.token(), &state.auth.secret)?;
    let caller = customer_id(&claims)?;

    let rx = state.notify_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |result| async move {
        match result {
            Ok(event) if event.customer_id() == caller => {
                let name = match &event {
                    UserNotification::StatusChanged(_) => "status_changed",
                    UserNotification::PaymentChanged(_) => "payment_changed",
                };
                Event::default().event(name).json_data(&event).ok().map(Ok)
            }
            // Other customers' events and lagged slots are not ours to report.
            _ => None,
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
