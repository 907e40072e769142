use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    domain::{
        Booking, CancelBookingRequest, CreateBookingRequest, EditBookingRequest, EditOutcome,
        EditQuote, PaymentView,
    },
    error::{AppError, Result},
};

/// Loads a booking the caller owns (admins may load any).
pub(crate) async fn authorized_booking(state: &AppState, user: &CurrentUser, id: Uuid) -> Result<Booking> {
    let booking = state.service_context.booking_service.get_booking(id).await?;
    if !user.can_access(&booking) {
        return Err(AppError::Forbidden);
    }
    Ok(booking)
}

#[utoipa::path(
    post,
    path = "/api/bookings",
    tag = "bookings",
    request_body = CreateBookingRequest,
    responses(
        (status = 201, description = "Pending booking created", body = Booking),
        (status = 404, description = "Stale catalog reference"),
        (status = 422, description = "Invalid counts or missing selection")
    )
)]
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>)> {
    let booking = state
        .service_context
        .booking_service
        .create_booking(user.id, request)
        .await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

#[utoipa::path(
    get,
    path = "/api/bookings",
    tag = "bookings",
    responses((status = 200, description = "Caller's bookings", body = [Booking]))
)]
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<Booking>>> {
    let bookings = state
        .service_context
        .booking_service
        .list_bookings_for_user(user.id)
        .await?;

    Ok(Json(bookings))
}

#[utoipa::path(
    get,
    path = "/api/bookings/{id}",
    tag = "bookings",
    params(("id" = Uuid, Path, description = "Booking id")),
    responses(
        (status = 200, body = Booking),
        (status = 404, description = "No such booking")
    )
)]
pub async fn get(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>> {
    Ok(Json(authorized_booking(&state, &user, id).await?))
}

#[utoipa::path(
    get,
    path = "/api/bookings/{id}/payments",
    tag = "bookings",
    params(("id" = Uuid, Path, description = "Booking id")),
    responses((status = 200, description = "Payments with their reconciliation state", body = [PaymentView]))
)]
pub async fn payments(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<PaymentView>>> {
    authorized_booking(&state, &user, id).await?;
    let payments = state.service_context.booking_service.list_payments(id).await?;
    Ok(Json(payments))
}

#[utoipa::path(
    post,
    path = "/api/bookings/cancel",
    tag = "bookings",
    request_body = CancelBookingRequest,
    responses(
        (status = 200, description = "Booking cancelled", body = Booking),
        (status = 409, description = "Already cancelled, completed, or the date has passed")
    )
)]
pub async fn cancel(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<CancelBookingRequest>,
) -> Result<Json<Booking>> {
    authorized_booking(&state, &user, request.booking_id).await?;
    let booking = state
        .service_context
        .booking_service
        .cancel_booking(request.booking_id)
        .await?;

    state.dispatcher.spawn_drain();
    Ok(Json(booking))
}

#[utoipa::path(
    post,
    path = "/api/bookings/{id}/edit/price-diff",
    tag = "bookings",
    params(("id" = Uuid, Path, description = "Booking id")),
    request_body = EditBookingRequest,
    responses((status = 200, body = EditQuote))
)]
pub async fn price_diff(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<EditBookingRequest>,
) -> Result<Json<EditQuote>> {
    authorized_booking(&state, &user, id).await?;
    let quote = state
        .service_context
        .booking_service
        .calculate_edit_price_diff(id, &request)
        .await?;
    Ok(Json(quote))
}

#[utoipa::path(
    post,
    path = "/api/bookings/{id}/edit",
    tag = "bookings",
    params(("id" = Uuid, Path, description = "Booking id")),
    request_body = EditBookingRequest,
    responses(
        (status = 200, body = EditOutcome),
        (status = 422, description = "Edit changes the total and needs the refund or payment flow")
    )
)]
pub async fn edit(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<EditBookingRequest>,
) -> Result<Json<EditOutcome>> {
    authorized_booking(&state, &user, id).await?;
    let outcome = state
        .service_context
        .booking_service
        .update_booking_direct(id, &request)
        .await?;

    state.dispatcher.spawn_drain();
    Ok(Json(outcome))
}

#[utoipa::path(
    post,
    path = "/api/bookings/{id}/edit/refund",
    tag = "bookings",
    params(("id" = Uuid, Path, description = "Booking id")),
    request_body = EditBookingRequest,
    responses((status = 200, body = EditOutcome))
)]
pub async fn edit_refund(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<EditBookingRequest>,
) -> Result<Json<EditOutcome>> {
    authorized_booking(&state, &user, id).await?;
    let outcome = state
        .service_context
        .booking_service
        .refund_downgrade(id, &request)
        .await?;

    state.dispatcher.spawn_drain();
    Ok(Json(outcome))
}

#[utoipa::path(
    post,
    path = "/api/bookings/{id}/edit/payment-intent",
    tag = "bookings",
    params(("id" = Uuid, Path, description = "Booking id")),
    request_body = EditBookingRequest,
    responses((status = 200, body = EditOutcome))
)]
pub async fn edit_payment_intent(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<EditBookingRequest>,
) -> Result<Json<EditOutcome>> {
    authorized_booking(&state, &user, id).await?;
    let outcome = state
        .service_context
        .booking_service
        .create_upcharge_intent(id, &request)
        .await?;

    state.dispatcher.spawn_drain();
    Ok(Json(outcome))
}
