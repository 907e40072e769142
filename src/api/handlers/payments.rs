use axum::{
    extract::{Extension, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    api::{handlers::bookings::authorized_booking, middleware::auth::CurrentUser, state::AppState},
    domain::{CreatePaymentIntentRequest, PaymentIntentResponse},
    error::{AppError, Result},
    payments::{webhook::SIGNATURE_HEADER, WebhookEvent},
};

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}

#[utoipa::path(
    post,
    path = "/api/payments/intent",
    tag = "payments",
    request_body = CreatePaymentIntentRequest,
    responses(
        (status = 200, body = PaymentIntentResponse),
        (status = 422, description = "Amount does not match the booking total"),
        (status = 502, description = "Payment provider unavailable")
    )
)]
pub async fn create_intent(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<CreatePaymentIntentRequest>,
) -> Result<Json<PaymentIntentResponse>> {
    authorized_booking(&state, &user, request.booking_id).await?;
    let response = state
        .service_context
        .booking_service
        .initiate_payment(request.booking_id, request.amount_cents)
        .await?;

    Ok(Json(response))
}

/// Stripe webhook endpoint. Signature and payload problems are a 400; a
/// persistence failure is a 5xx so Stripe redelivers; everything else is
/// acknowledged.
#[utoipa::path(
    post,
    path = "/api/payments/webhook/stripe",
    tag = "payments",
    request_body(content = String, description = "Raw Stripe event JSON"),
    responses(
        (status = 200, body = WebhookAck),
        (status = 400, description = "Bad signature or malformed event")
    )
)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookAck>> {
    let reconciler = state
        .service_context
        .reconciler
        .as_ref()
        .ok_or_else(|| AppError::ServiceUnavailable("Payments are not configured".to_string()))?;

    let secret = state
        .settings
        .stripe
        .webhook_secret
        .as_deref()
        .ok_or_else(|| AppError::ServiceUnavailable("Webhook secret is not configured".to_string()))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing Stripe-Signature header".to_string()))?;

    let event = WebhookEvent::construct(&body, signature, secret).map_err(|e| {
        tracing::warn!("Rejected webhook: {}", e);
        e
    })?;

    let event_id = event.id.clone();
    let event_type = event.event_type.clone();

    match reconciler.handle(event).await {
        Ok(outcome) => {
            tracing::info!(%event_id, %event_type, outcome = outcome.as_str(), "Webhook handled");
            state.dispatcher.spawn_drain();
            Ok(Json(WebhookAck { received: true }))
        }
        Err(e) => {
            tracing::error!(%event_id, %event_type, "Webhook handling failed, provider will retry: {}", e);
            Err(e)
        }
    }
}
