use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    api::state::AppState,
    domain::{AdminRefundRequest, Booking, NotificationLogEntry, RefundSummary},
    error::Result,
    notifications::DispatchSummary,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct CompletionSummary {
    pub completed: usize,
    pub bookings: Vec<Booking>,
}

#[utoipa::path(
    post,
    path = "/admin/bookings/{id}/refund",
    tag = "admin",
    params(("id" = Uuid, Path, description = "Booking id")),
    request_body = AdminRefundRequest,
    responses(
        (status = 200, description = "Refund requested; finalized by webhook", body = RefundSummary),
        (status = 409, description = "No completed payment")
    )
)]
pub async fn refund(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AdminRefundRequest>,
) -> Result<Json<RefundSummary>> {
    let refund = state
        .service_context
        .booking_service
        .request_refund(id, request)
        .await?;
    Ok(Json(refund))
}

#[utoipa::path(
    post,
    path = "/admin/bookings/complete-past",
    tag = "admin",
    responses((status = 200, body = CompletionSummary))
)]
pub async fn complete_past(State(state): State<AppState>) -> Result<Json<CompletionSummary>> {
    let bookings = state
        .service_context
        .booking_service
        .complete_past_bookings(Utc::now())
        .await?;

    Ok(Json(CompletionSummary {
        completed: bookings.len(),
        bookings,
    }))
}

#[utoipa::path(
    get,
    path = "/admin/bookings/{id}/notifications",
    tag = "admin",
    params(("id" = Uuid, Path, description = "Booking id")),
    responses((status = 200, body = [NotificationLogEntry]))
)]
pub async fn notifications(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<NotificationLogEntry>>> {
    let entries = state
        .service_context
        .notification_log_repo
        .list_by_booking(id)
        .await?;
    Ok(Json(entries))
}

#[utoipa::path(
    post,
    path = "/admin/outbox/dispatch",
    tag = "admin",
    responses((status = 200, body = DispatchSummary))
)]
pub async fn dispatch_outbox(State(state): State<AppState>) -> Result<Json<DispatchSummary>> {
    Ok(Json(state.dispatcher.dispatch_pending().await?))
}
